//! 命令行参数定义
//!
//! 所有可调参数都支持环境变量，便于脚本调用。

use std::path::PathBuf;

use bfe::crypto::kdf::{DEFAULT_MEMORY_COST_KIB, DEFAULT_PARALLELISM, DEFAULT_TIME_COST};
use bfe::{BfeError, DEFAULT_CHUNK_SIZE, EncryptionParameters};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "bfe",
    version,
    about = "Password-based streaming file encryption (BFE5 containers)"
)]
pub struct Cli {
    /// 日志详细程度（-v info，-vv debug，-vvv trace）；RUST_LOG 优先
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(
        long,
        value_enum,
        default_value_t = LogFormat::Text,
        env = "BFE_LOG_FORMAT",
        global = true
    )]
    pub log_format: LogFormat,

    /// 口令；未提供时交互式输入
    #[arg(long, env = "BFE_PASSPHRASE", hide_env_values = true, global = true)]
    pub passphrase: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Encrypt a file into a .bfe container
    Encrypt(EncryptArgs),
    /// Decrypt a .bfe container
    Decrypt(DecryptArgs),
    /// Show the container header (no passphrase needed)
    Inspect {
        input: PathBuf,
    },
    /// Encrypt a short text; prints base64
    EncryptText(EncryptTextArgs),
    /// Decrypt the output of encrypt-text
    DecryptText {
        /// Encrypted text; read from stdin when omitted
        data: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct EncryptArgs {
    pub input: PathBuf,

    /// Output path (default: <input name>.bfe next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Plaintext bytes per chunk
    #[arg(long, env = "BFE_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u32,

    #[command(flatten)]
    pub kdf: KdfArgs,

    /// Replace an existing output file
    #[arg(short, long)]
    pub force: bool,

    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Args)]
pub struct DecryptArgs {
    pub input: PathBuf,

    /// Output path (default: the original filename next to the input)
    #[arg(short, long, conflicts_with = "output_dir")]
    pub output: Option<PathBuf>,

    /// Directory to write the original filename into
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Replace an existing output file
    #[arg(short, long)]
    pub force: bool,

    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Args)]
pub struct EncryptTextArgs {
    /// Text to encrypt; read from stdin when omitted
    pub text: Option<String>,

    #[command(flatten)]
    pub kdf: KdfArgs,
}

/// Argon2id 参数
#[derive(Debug, Args)]
pub struct KdfArgs {
    #[arg(long, env = "BFE_TIME_COST", default_value_t = DEFAULT_TIME_COST)]
    pub time_cost: u32,

    /// Memory cost in KiB
    #[arg(long, env = "BFE_MEMORY_COST", default_value_t = DEFAULT_MEMORY_COST_KIB)]
    pub memory_cost: u32,

    #[arg(long, env = "BFE_PARALLELISM", default_value_t = DEFAULT_PARALLELISM)]
    pub parallelism: u8,
}

impl KdfArgs {
    pub fn to_params(&self) -> Result<EncryptionParameters, BfeError> {
        EncryptionParameters::new(self.time_cost, self.memory_cost, self.parallelism)
    }
}
