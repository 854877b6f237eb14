use std::path::PathBuf;

use clap::Parser;
use variants::ShaderModel;

#[derive(Parser, Debug)]
#[command(
    name = "shaderbatch",
    author,
    version,
    about = "Offline shader-variation compiler",
    after_help = "HLSL sources are loaded from the definition file's directory; packed binary \
                  containers are written under the output directory, preserving the input \
                  subdirectory structure."
)]
pub struct Cli {
    /// Definition file enumerating base shaders and their variations.
    #[arg(value_name = "DEFINITION")]
    pub definition: PathBuf,

    /// Directory that receives the packed shader containers.
    #[arg(value_name = "OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Shader model selector (`SM2`/`SM3`) and extra global defines.
    #[arg(value_name = "SM3|SM2|DEFINE")]
    pub defines: Vec<String>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

/// Normalizes the trailing CLI tokens: every token is upper-cased and kept
/// as a global define (the tier token included, so `require = "SM3"` checks
/// keep working), and the last tier selector wins.
pub fn resolve_globals(tokens: &[String]) -> (ShaderModel, Vec<String>) {
    let mut model = ShaderModel::Sm2;
    let mut defines = Vec::with_capacity(tokens.len());

    for token in tokens {
        let upper = token.to_ascii_uppercase();
        match upper.as_str() {
            "SM3" => model = ShaderModel::Sm3,
            "SM2" => model = ShaderModel::Sm2,
            _ => {}
        }
        defines.push(upper);
    }

    (model, defines)
}
