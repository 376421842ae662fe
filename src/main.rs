//! BFE 命令行入口
//!
//! 用法：
//!   bfe encrypt <input> [-o <output>]
//!   bfe decrypt <input> [-o <output> | --output-dir <dir>]
//!   bfe inspect <input>
//!   bfe encrypt-text [text]
//!   bfe decrypt-text [data]
//!
//! 设计原则：
//! - 实际逻辑全部委托给 bfe 库
//! - 文件加解密在阻塞线程中运行，Ctrl-C 只设置取消标志，
//!   由流水线在块边界处停止并丢弃临时输出

mod cli;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use zeroize::Zeroizing;

use bfe::progress::{format_bytes, format_eta, format_speed};
use bfe::{
    BfeError, CancelToken, DecryptOptions, EncryptOptions, Progress, StreamControl,
    decrypt_file, decrypt_into_dir, encrypt_file, read_header, suggested_output_name,
};

use cli::{Cli, Command, DecryptArgs, EncryptArgs, LogFormat};

/// 退出码：用户取消
const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Clone, Copy)]
enum Operation {
    Encrypt,
    Decrypt,
    Other,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let operation = match cli.command {
        Command::Encrypt(_) | Command::EncryptText(_) => Operation::Encrypt,
        Command::Decrypt(_) | Command::DecryptText { .. } => Operation::Decrypt,
        Command::Inspect { .. } => Operation::Other,
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(operation, &err),
    }
}

fn report(operation: Operation, err: &anyhow::Error) -> ExitCode {
    let Some(bfe_err) = err.downcast_ref::<BfeError>() else {
        eprintln!("Error: {err:#}");
        return ExitCode::FAILURE;
    };

    if bfe_err.is_cancelled() {
        eprintln!("Cancelled.");
        return ExitCode::from(EXIT_CANCELLED);
    }

    debug!(error = %bfe_err, "operation failed");
    match operation {
        Operation::Decrypt => eprintln!("Error: {}", bfe_err.user_message()),
        Operation::Encrypt | Operation::Other => eprintln!("Error: {bfe_err}"),
    }
    ExitCode::FAILURE
}

fn init_logging(verbose: u8, format: LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Encrypt(args) => encrypt_command(args, cli.passphrase).await,
        Command::Decrypt(args) => decrypt_command(args, cli.passphrase).await,
        Command::Inspect { input } => inspect_command(&input),
        Command::EncryptText(args) => {
            let text = Zeroizing::new(arg_or_stdin(args.text)?);
            let params = args.kdf.to_params()?;
            let passphrase = read_passphrase(cli.passphrase, true)?;
            println!("{}", bfe::encrypt_text(text.trim_end_matches('\n'), &passphrase, &params)?);
            Ok(())
        }
        Command::DecryptText { data } => {
            let data = arg_or_stdin(data)?;
            let passphrase = read_passphrase(cli.passphrase, false)?;
            let text = bfe::decrypt_text(&data, &passphrase)?;
            println!("{}", text.as_str());
            Ok(())
        }
    }
}

async fn encrypt_command(args: EncryptArgs, passphrase: Option<String>) -> anyhow::Result<()> {
    let options = EncryptOptions {
        params: args.kdf.to_params()?,
        chunk_size: args.chunk_size,
        overwrite: args.force,
    };

    let input = args.input;
    let output = match args.output {
        Some(path) => path,
        None => default_encrypt_output(&input)?,
    };
    let total = std::fs::metadata(&input)
        .with_context(|| format!("cannot read {}", input.display()))?
        .len();

    let passphrase = read_passphrase(passphrase, true)?;
    let bar = progress_bar(total, "Encrypting", args.no_progress);

    let worker_bar = bar.clone();
    let worker_output = output.clone();
    let result = run_cancellable(move |token| {
        let on_progress = |p: &Progress| update_bar(&worker_bar, p);
        let control = StreamControl::new()
            .with_cancel(&token)
            .with_progress(&on_progress);
        encrypt_file(&input, &worker_output, &passphrase, &options, &control)
    })
    .await;
    bar.finish_and_clear();

    let summary = result?;
    println!(
        "Encrypted {} in {} chunks -> {}",
        format_bytes(summary.header.plaintext_size),
        summary.chunks,
        output.display()
    );
    Ok(())
}

async fn decrypt_command(args: DecryptArgs, passphrase: Option<String>) -> anyhow::Result<()> {
    // 先读 Header：不是 BFE5 文件时无需输入口令
    let header = read_header(&args.input)?;
    let passphrase = read_passphrase(passphrase, false)?;
    let bar = progress_bar(header.plaintext_size, "Decrypting", args.no_progress);

    let options = DecryptOptions {
        overwrite: args.force,
    };
    let input = args.input;
    let output = args.output;
    let output_dir = match args.output_dir {
        Some(dir) => dir,
        None => parent_dir(&input),
    };

    let worker_bar = bar.clone();
    let result = run_cancellable(move |token| {
        let on_progress = |p: &Progress| update_bar(&worker_bar, p);
        let control = StreamControl::new()
            .with_cancel(&token)
            .with_progress(&on_progress);

        match output {
            Some(path) => {
                decrypt_file(&input, &path, &passphrase, &options, &control).map(|s| (path, s))
            }
            None => decrypt_into_dir(&input, &output_dir, &passphrase, &options, &control),
        }
    })
    .await;
    bar.finish_and_clear();

    let (path, summary) = result?;
    println!(
        "Decrypted {} -> {}",
        format_bytes(summary.bytes_written),
        path.display()
    );
    Ok(())
}

fn inspect_command(input: &Path) -> anyhow::Result<()> {
    let header = read_header(input)?;

    println!("version:      {}", header.version);
    println!(
        "kdf:          Argon2id (t={}, m={} KiB, p={})",
        header.kdf.time_cost, header.kdf.memory_cost_kib, header.kdf.parallelism
    );
    println!("salt:         {}", hex::encode(header.salt));
    println!("base nonce:   {}", hex::encode(header.base_nonce));
    println!(
        "plaintext:    {} ({} bytes)",
        format_bytes(header.plaintext_size),
        header.plaintext_size
    );
    println!("chunk size:   {}", format_bytes(u64::from(header.chunk_size)));
    println!("chunks:       {}", header.chunk_count());
    Ok(())
}

/// 在阻塞线程中运行加解密任务，Ctrl-C 时设置取消标志并等待任务收尾
async fn run_cancellable<T, F>(job: F) -> anyhow::Result<T>
where
    F: FnOnce(CancelToken) -> Result<T, BfeError> + Send + 'static,
    T: Send + 'static,
{
    let token = CancelToken::new();
    let worker_token = token.clone();
    let mut handle = tokio::task::spawn_blocking(move || job(worker_token));

    tokio::select! {
        joined = &mut handle => {
            return Ok(joined.context("worker task failed")??);
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Cancelling…");
            token.cancel();
        }
    }

    Ok(handle.await.context("worker task failed")??)
}

fn read_passphrase(provided: Option<String>, confirm: bool) -> anyhow::Result<Zeroizing<String>> {
    if let Some(p) = provided {
        return Ok(Zeroizing::new(p));
    }

    let first = Zeroizing::new(rpassword::prompt_password("Passphrase: ")?);
    if first.is_empty() {
        bail!("passphrase must not be empty");
    }

    if confirm {
        let second = Zeroizing::new(rpassword::prompt_password("Confirm passphrase: ")?);
        if *first != *second {
            bail!("passphrases do not match");
        }
    }

    Ok(first)
}

fn arg_or_stdin(arg: Option<String>) -> anyhow::Result<String> {
    match arg {
        Some(value) => Ok(value),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn default_encrypt_output(input: &Path) -> anyhow::Result<PathBuf> {
    let name = input
        .file_name()
        .with_context(|| format!("{} has no file name", input.display()))?
        .to_string_lossy();
    Ok(parent_dir(input).join(suggested_output_name(&name)))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn progress_bar(total: u64, prefix: &'static str, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(total);
    if let Ok(style) =
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_prefix(prefix);
    bar
}

fn update_bar(bar: &ProgressBar, progress: &Progress) {
    bar.set_position(progress.processed);

    let mut msg = format!(
        "{} / {} • {}",
        format_bytes(progress.processed),
        format_bytes(progress.total),
        format_speed(progress.throughput)
    );
    if progress.eta.is_some() {
        msg.push_str(&format!(" • ETA {}", format_eta(progress.eta)));
    }
    bar.set_message(msg);
}
