use anyhow::{bail, Context, Result};
use glam::{Mat4, Vec3};
use glb2usdz::{ConvertOptions, MaterialMode, SceneModel, UsdzBuilder, XformMode};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const HELP: &str = "\
Convert glTF scenes into USDZ packages

USAGE:
  glb2usdz <input> [output] [OPTIONS]

OPTIONS:
  --format <usdz|usda|glb>  Output format [default: usdz]
  --config <file>           JSON file with conversion options
  --decomposed              Write translate, rotateXYZ and scale ops instead of matrices
  --legacy-materials        Write metallic 0 and roughness 1 when the source has none
  --root-scale <f>          Uniform scale applied on top of the root transform
  --pose-scale <f>          Uniform scale of the model's pose
  -h, --help                Print help
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Usdz,
    Usda,
    Glb,
}

impl OutputFormat {
    fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Usdz => "usdz",
            OutputFormat::Usda => "usda",
            OutputFormat::Glb => "glb",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usdz" => Ok(OutputFormat::Usdz),
            "usda" => Ok(OutputFormat::Usda),
            "glb" => Ok(OutputFormat::Glb),
            _ => Err(format!("unknown output format {:?}", s)),
        }
    }
}

struct Args {
    input: PathBuf,
    output: Option<PathBuf>,
    format: OutputFormat,
    config: Option<PathBuf>,
    decomposed: bool,
    legacy_materials: bool,
    root_scale: Option<f32>,
    pose_scale: Option<f32>,
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        print!("{}", HELP);
        return Ok(None);
    }

    // Options are parsed before positional arguments.
    let parsed = Args {
        format: args
            .opt_value_from_str("--format")?
            .unwrap_or(OutputFormat::Usdz),
        config: args.opt_value_from_str("--config")?,
        decomposed: args.contains("--decomposed"),
        legacy_materials: args.contains("--legacy-materials"),
        root_scale: args.opt_value_from_str("--root-scale")?,
        pose_scale: args.opt_value_from_str("--pose-scale")?,
        input: args.free_from_str()?,
        output: args.opt_free_from_str()?,
    };

    let remaining = args.finish();
    if !remaining.is_empty() {
        bail!("unexpected arguments: {:?}", remaining);
    }
    Ok(Some(parsed))
}

fn load_options(args: &Args) -> Result<ConvertOptions> {
    let mut options = match &args.config {
        Some(path) => ConvertOptions::from_json_file(path)
            .with_context(|| format!("failed to read config {:?}", path))?,
        None => ConvertOptions::default(),
    };
    if args.decomposed {
        options.xform_mode = XformMode::Decomposed;
    }
    if args.legacy_materials {
        options.material_mode = MaterialMode::Legacy;
    }
    if let Some(scale) = args.root_scale {
        options.root_transform =
            (Mat4::from_scale(Vec3::splat(scale)) * options.root_transform()).to_cols_array();
    }
    Ok(options)
}

fn write_usda_with_textures(builder: &UsdzBuilder, output: &Path) -> Result<()> {
    let document = builder.to_usda()?;
    if !document.textures.is_empty() {
        let folder = output
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join("textures");
        std::fs::create_dir_all(&folder)
            .with_context(|| format!("failed to create {:?}", folder))?;
        for (file_name, bytes) in document.textures.iter() {
            let path = folder.join(file_name);
            std::fs::write(&path, bytes).with_context(|| format!("failed to write {:?}", path))?;
        }
    }
    std::fs::write(output, document.text).with_context(|| format!("failed to write {:?}", output))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(args) = parse_args()? else {
        return Ok(());
    };
    let options = load_options(&args)?;

    let model = SceneModel::from_path(&args.input)
        .with_context(|| format!("failed to load {:?}", args.input))?;
    let pose = args
        .pose_scale
        .map(|s| Mat4::from_scale(Vec3::splat(s)))
        .unwrap_or(Mat4::IDENTITY);

    let mut builder = UsdzBuilder::with_options(options);
    builder.add_model(model, pose);

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension(args.format.extension()));

    // Build in memory so a failed conversion never leaves a partial file.
    match args.format {
        OutputFormat::Usdz => {
            let bytes = builder.to_usdz_bytes()?;
            std::fs::write(&output, bytes)
                .with_context(|| format!("failed to write {:?}", output))?;
        }
        OutputFormat::Usda => write_usda_with_textures(&builder, &output)?,
        OutputFormat::Glb => {
            let mut bytes = Vec::new();
            builder.write_glb(&mut bytes)?;
            std::fs::write(&output, bytes)
                .with_context(|| format!("failed to write {:?}", output))?;
        }
    }

    log::info!("Saved {:?}", output);
    Ok(())
}
