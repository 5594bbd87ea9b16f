//! USD ASCII text emission.
//!
//! One function per construct. Output is deterministic: vectors and scalars
//! use the fixed decimals of [NumberFormat], matrices use the shortest
//! round-trip representation, and arrays keep source order.

use glam::Mat4;
use std::fmt::{Result, Write};

use crate::config::{NumberFormat, XformMode};
use crate::geometry::PrimitiveGeometry;
use crate::transform::decompose;

/// Write the layer header.
pub fn write_header(out: &mut String, apple_ibl_hint: bool) -> Result {
    writeln!(out, "#usda 1.0")?;
    if apple_ibl_hint {
        writeln!(out, "(")?;
        writeln!(out, "    customLayerData = {{")?;
        writeln!(out, "        dictionary Apple = {{")?;
        writeln!(out, "            int preferredIblVersion = 2")?;
        writeln!(out, "        }}")?;
        writeln!(out, "    }}")?;
        writeln!(out, ")")?;
    }
    writeln!(out)
}

/// Open the `root` Xform that wraps every mesh prim.
pub fn write_root_begin(out: &mut String) -> Result {
    writeln!(out, "def Xform \"root\"")?;
    writeln!(out, "{{")
}

pub fn write_root_end(out: &mut String) -> Result {
    writeln!(out, "}}")
}

/// Format a matrix as four row tuples.
///
/// USD matrices are row-vector, so each glam column becomes one printed row
/// and the translation ends up in the last row.
pub fn format_matrix(matrix: &Mat4) -> String {
    let rows = matrix
        .to_cols_array_2d()
        .iter()
        .map(|c| format!("({}, {}, {}, {})", c[0], c[1], c[2], c[3]))
        .collect::<Vec<_>>();
    format!("( {} )", rows.join(", "))
}

pub fn write_vec3_array(out: &mut String, values: &[[f32; 3]], format: &NumberFormat) {
    out.push('[');
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format.vec3(*v));
    }
    out.push(']');
}

pub fn write_vec2_array(out: &mut String, values: &[[f32; 2]], format: &NumberFormat) {
    out.push('[');
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format.vec2(*v));
    }
    out.push(']');
}

pub fn write_int_array(out: &mut String, values: &[u32]) -> Result {
    out.push('[');
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write!(out, "{}", v)?;
    }
    out.push(']');
    Ok(())
}

/// Every face is a triangle, so the counts are a run of `3`.
pub fn write_face_vertex_counts(out: &mut String, triangle_count: usize) {
    out.push('[');
    for i in 0..triangle_count {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('3');
    }
    out.push(']');
}

fn write_xform_ops(
    out: &mut String,
    transform: &Mat4,
    mode: XformMode,
    format: &NumberFormat,
) -> Result {
    match mode {
        XformMode::Matrix => {
            writeln!(
                out,
                "        matrix4d xformOp:transform = {}",
                format_matrix(transform)
            )?;
            writeln!(
                out,
                "        uniform token[] xformOpOrder = [\"xformOp:transform\"]"
            )
        }
        XformMode::Decomposed => {
            let decomposed = decompose(transform);
            writeln!(
                out,
                "        double3 xformOp:translate = {}",
                format.vec3(decomposed.translation.to_array())
            )?;
            writeln!(
                out,
                "        float3 xformOp:rotateXYZ = {}",
                format.vec3(decomposed.rotation_xyz.to_array())
            )?;
            writeln!(
                out,
                "        float3 xformOp:scale = {}",
                format.vec3(decomposed.scale.to_array())
            )?;
            writeln!(
                out,
                "        uniform token[] xformOpOrder = [\"xformOp:translate\", \"xformOp:rotateXYZ\", \"xformOp:scale\"]"
            )
        }
    }
}

/// A mesh prim ready for emission.
#[derive(Debug)]
pub struct MeshPrim<'a> {
    pub name: &'a str,
    pub transform: Mat4,
    pub geometry: &'a PrimitiveGeometry,
    /// Name of the top-level material prim to bind.
    pub material: Option<&'a str>,
}

/// Write one `def Mesh` block nested in the root Xform.
pub fn write_mesh(
    out: &mut String,
    mesh: &MeshPrim,
    mode: XformMode,
    format: &NumberFormat,
) -> Result {
    let geometry = mesh.geometry;

    writeln!(out, "    def Mesh \"{}\"", mesh.name)?;
    writeln!(out, "    {{")?;
    write_xform_ops(out, &mesh.transform, mode, format)?;
    writeln!(out)?;

    out.push_str("        point3f[] points = ");
    write_vec3_array(out, &geometry.points, format);
    writeln!(out)?;

    if let Some(normals) = &geometry.normals {
        out.push_str("        normal3f[] normals = ");
        write_vec3_array(out, normals, format);
        writeln!(out, " (")?;
        writeln!(out, "            interpolation = \"vertex\"")?;
        writeln!(out, "        )")?;
    }

    out.push_str("        int[] faceVertexIndices = ");
    write_int_array(out, &geometry.indices)?;
    writeln!(out)?;

    out.push_str("        int[] faceVertexCounts = ");
    write_face_vertex_counts(out, geometry.triangle_count());
    writeln!(out)?;

    if let Some(tex_coords) = &geometry.tex_coords {
        out.push_str("        texCoord2f[] primvars:st = ");
        write_vec2_array(out, tex_coords, format);
        writeln!(out, " (")?;
        writeln!(out, "            interpolation = \"vertex\"")?;
        writeln!(out, "        )")?;
    }

    writeln!(out, "        uniform token subdivisionScheme = \"none\"")?;

    if let Some(material) = mesh.material {
        writeln!(out, "        rel material:binding = </{}>", material)?;
    }
    writeln!(out, "    }}")
}

/// Source of a material's diffuse color.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffuseInput {
    Color([f32; 3]),
    /// File name of the texture inside the package's `textures/` folder.
    Texture(String),
}

/// A material prim ready for emission.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialPrim {
    pub name: String,
    pub diffuse: DiffuseInput,
    pub clearcoat: Option<f32>,
    pub clearcoat_roughness: Option<f32>,
    pub metallic: Option<f32>,
    pub roughness: Option<f32>,
}

/// Write one top-level `def Material` block with its shader graph.
pub fn write_material(out: &mut String, material: &MaterialPrim, format: &NumberFormat) -> Result {
    let name = &material.name;

    writeln!(out, "def Material \"{}\"", name)?;
    writeln!(out, "{{")?;
    writeln!(out, "    token inputs:frame:stPrimvarName = \"st\"")?;
    writeln!(
        out,
        "    token outputs:surface.connect = </{}/PBRShader.outputs:surface>",
        name
    )?;
    writeln!(out)?;

    writeln!(out, "    def Shader \"PBRShader\"")?;
    writeln!(out, "    {{")?;
    writeln!(out, "        uniform token info:id = \"UsdPreviewSurface\"")?;
    match &material.diffuse {
        DiffuseInput::Color(color) => writeln!(
            out,
            "        color3f inputs:diffuseColor = {}",
            format.vec3(*color)
        )?,
        DiffuseInput::Texture(_) => writeln!(
            out,
            "        color3f inputs:diffuseColor.connect = </{}/diffuseTexture.outputs:rgb>",
            name
        )?,
    }
    let scalars = [
        ("clearcoat", material.clearcoat),
        ("clearcoatRoughness", material.clearcoat_roughness),
        ("metallic", material.metallic),
        ("roughness", material.roughness),
    ];
    for (input, value) in scalars {
        if let Some(value) = value {
            writeln!(out, "        float inputs:{} = {}", input, format.scalar(value))?;
        }
    }
    writeln!(out, "        token outputs:surface")?;
    writeln!(out, "    }}")?;

    if let DiffuseInput::Texture(file) = &material.diffuse {
        writeln!(out)?;
        writeln!(out, "    def Shader \"stReader\"")?;
        writeln!(out, "    {{")?;
        writeln!(out, "        uniform token info:id = \"UsdPrimvarReader_float2\"")?;
        writeln!(
            out,
            "        token inputs:varname.connect = </{}.inputs:frame:stPrimvarName>",
            name
        )?;
        writeln!(out, "        float2 outputs:result")?;
        writeln!(out, "    }}")?;
        writeln!(out)?;
        writeln!(out, "    def Shader \"diffuseTexture\"")?;
        writeln!(out, "    {{")?;
        writeln!(out, "        uniform token info:id = \"UsdUVTexture\"")?;
        writeln!(out, "        asset inputs:file = @textures/{}@", file)?;
        writeln!(out, "        token inputs:sourceColorSpace = \"raw\"")?;
        writeln!(
            out,
            "        float2 inputs:st.connect = </{}/stReader.outputs:result>",
            name
        )?;
        writeln!(out, "        token inputs:wrapS = \"repeat\"")?;
        writeln!(out, "        token inputs:wrapT = \"repeat\"")?;
        writeln!(out, "        float3 outputs:rgb")?;
        writeln!(out, "    }}")?;
    }
    writeln!(out, "}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn triangle() -> PrimitiveGeometry {
        PrimitiveGeometry {
            indices: vec![0, 1, 2],
            points: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: None,
            tex_coords: None,
        }
    }

    fn mesh_text(mesh: &MeshPrim, mode: XformMode) -> String {
        let mut out = String::new();
        write_mesh(&mut out, mesh, mode, &NumberFormat::default()).unwrap();
        out
    }

    #[test]
    fn header_with_ibl_hint() {
        let mut out = String::new();
        write_header(&mut out, true).unwrap();
        assert_eq!(
            "#usda 1.0\n(\n    customLayerData = {\n        dictionary Apple = {\n            int preferredIblVersion = 2\n        }\n    }\n)\n\n",
            out
        );
    }

    #[test]
    fn header_without_ibl_hint() {
        let mut out = String::new();
        write_header(&mut out, false).unwrap();
        assert_eq!("#usda 1.0\n\n", out);
    }

    #[test]
    fn matrix_rows_are_columns() {
        assert_eq!(
            "( (1, 0, 0, 0), (0, 1, 0, 0), (0, 0, 1, 0), (1.5, -2, 0.25, 1) )",
            format_matrix(&Mat4::from_translation(Vec3::new(1.5, -2.0, 0.25)))
        );
    }

    #[test]
    fn arrays_keep_source_order() {
        let format = NumberFormat::default();
        let mut out = String::new();
        write_vec3_array(&mut out, &[[1.0, -2.5, 0.333333333], [0.0, 0.0, 0.0]], &format);
        assert_eq!(
            "[(1.0000000, -2.5000000, 0.3333333),(0.0000000, 0.0000000, 0.0000000)]",
            out
        );

        let mut out = String::new();
        write_int_array(&mut out, &[2, 0, 1]).unwrap();
        assert_eq!("[2, 0, 1]", out);

        let mut out = String::new();
        write_face_vertex_counts(&mut out, 3);
        assert_eq!("[3, 3, 3]", out);

        let mut out = String::new();
        write_vec2_array(&mut out, &[[0.5, 1.0]], &format);
        assert_eq!("[(0.5000000, 1.0000000)]", out);
    }

    #[test]
    fn mesh_without_optional_attributes() {
        let geometry = triangle();
        let text = mesh_text(
            &MeshPrim {
                name: "mesh_0_0",
                transform: Mat4::IDENTITY,
                geometry: &geometry,
                material: None,
            },
            XformMode::Matrix,
        );
        assert_eq!(
            concat!(
                "    def Mesh \"mesh_0_0\"\n",
                "    {\n",
                "        matrix4d xformOp:transform = ( (1, 0, 0, 0), (0, 1, 0, 0), (0, 0, 1, 0), (0, 0, 0, 1) )\n",
                "        uniform token[] xformOpOrder = [\"xformOp:transform\"]\n",
                "\n",
                "        point3f[] points = [(0.0000000, 0.0000000, 0.0000000),(1.0000000, 0.0000000, 0.0000000),(0.0000000, 1.0000000, 0.0000000)]\n",
                "        int[] faceVertexIndices = [0, 1, 2]\n",
                "        int[] faceVertexCounts = [3]\n",
                "        uniform token subdivisionScheme = \"none\"\n",
                "    }\n",
            ),
            text
        );
    }

    #[test]
    fn mesh_with_normals_uvs_and_material() {
        let geometry = PrimitiveGeometry {
            normals: Some(vec![[0.0, 0.0, 1.0]; 3]),
            tex_coords: Some(vec![[0.0, 1.0], [1.0, 1.0], [0.0, 0.0]]),
            ..triangle()
        };
        let text = mesh_text(
            &MeshPrim {
                name: "mesh_1_4",
                transform: Mat4::IDENTITY,
                geometry: &geometry,
                material: Some("mat_1_2"),
            },
            XformMode::Matrix,
        );
        assert!(text.contains(
            "        normal3f[] normals = [(0.0000000, 0.0000000, 1.0000000),(0.0000000, 0.0000000, 1.0000000),(0.0000000, 0.0000000, 1.0000000)] (\n            interpolation = \"vertex\"\n        )\n"
        ));
        assert!(text.contains(
            "        texCoord2f[] primvars:st = [(0.0000000, 1.0000000),(1.0000000, 1.0000000),(0.0000000, 0.0000000)] (\n            interpolation = \"vertex\"\n        )\n"
        ));
        assert!(text.contains("        rel material:binding = </mat_1_2>\n"));

        let normals = text.find("normals").unwrap();
        let indices = text.find("faceVertexIndices").unwrap();
        let st = text.find("primvars:st").unwrap();
        assert!(normals < indices && indices < st);
    }

    #[test]
    fn mesh_decomposed_ops() {
        let geometry = triangle();
        let text = mesh_text(
            &MeshPrim {
                name: "mesh_0_0",
                transform: Mat4::from_scale_rotation_translation(
                    Vec3::splat(2.0),
                    glam::Quat::IDENTITY,
                    Vec3::new(1.0, 2.0, 3.0),
                ),
                geometry: &geometry,
                material: None,
            },
            XformMode::Decomposed,
        );
        assert!(text.contains("        double3 xformOp:translate = (1.0000000, 2.0000000, 3.0000000)\n"));
        assert!(text.contains("        float3 xformOp:rotateXYZ = (0.0000000, 0.0000000, 0.0000000)\n"));
        assert!(text.contains("        float3 xformOp:scale = (2.0000000, 2.0000000, 2.0000000)\n"));
        assert!(text.contains(
            "uniform token[] xformOpOrder = [\"xformOp:translate\", \"xformOp:rotateXYZ\", \"xformOp:scale\"]"
        ));
        assert!(!text.contains("matrix4d"));
    }

    #[test]
    fn material_with_color_and_factors() {
        let mut out = String::new();
        write_material(
            &mut out,
            &MaterialPrim {
                name: "mat_0_0".to_string(),
                diffuse: DiffuseInput::Color([1.0, 0.5, 0.25]),
                clearcoat: None,
                clearcoat_roughness: None,
                metallic: Some(0.0),
                roughness: Some(1.0),
            },
            &NumberFormat::default(),
        )
        .unwrap();
        assert_eq!(
            concat!(
                "def Material \"mat_0_0\"\n",
                "{\n",
                "    token inputs:frame:stPrimvarName = \"st\"\n",
                "    token outputs:surface.connect = </mat_0_0/PBRShader.outputs:surface>\n",
                "\n",
                "    def Shader \"PBRShader\"\n",
                "    {\n",
                "        uniform token info:id = \"UsdPreviewSurface\"\n",
                "        color3f inputs:diffuseColor = (1.0000000, 0.5000000, 0.2500000)\n",
                "        float inputs:metallic = 0.0000000\n",
                "        float inputs:roughness = 1.0000000\n",
                "        token outputs:surface\n",
                "    }\n",
                "}\n",
            ),
            out
        );
    }

    #[test]
    fn material_with_texture() {
        let mut out = String::new();
        write_material(
            &mut out,
            &MaterialPrim {
                name: "mat_1_3".to_string(),
                diffuse: DiffuseInput::Texture("1_0.png".to_string()),
                clearcoat: Some(1.0),
                clearcoat_roughness: Some(0.5),
                metallic: None,
                roughness: None,
            },
            &NumberFormat::default(),
        )
        .unwrap();
        assert!(out.contains(
            "        color3f inputs:diffuseColor.connect = </mat_1_3/diffuseTexture.outputs:rgb>\n"
        ));
        assert!(!out.contains("color3f inputs:diffuseColor ="));
        assert!(out.contains("        float inputs:clearcoat = 1.0000000\n"));
        assert!(out.contains("        float inputs:clearcoatRoughness = 0.5000000\n"));
        assert!(!out.contains("inputs:metallic"));
        assert!(!out.contains("inputs:roughness"));
        assert!(out.contains("    def Shader \"stReader\"\n"));
        assert!(out.contains(
            "        token inputs:varname.connect = </mat_1_3.inputs:frame:stPrimvarName>\n"
        ));
        assert!(out.contains("        asset inputs:file = @textures/1_0.png@\n"));
        assert!(out.contains("        token inputs:sourceColorSpace = \"raw\"\n"));
        assert!(out.contains("        float2 inputs:st.connect = </mat_1_3/stReader.outputs:result>\n"));
        assert!(out.contains("        token inputs:wrapS = \"repeat\"\n"));
        assert!(out.contains("        token inputs:wrapT = \"repeat\"\n"));
    }
}
