use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flate2::{write::GzEncoder, Compression};
use safedate_updater::{
    signing, HttpFetcher, ReleaseMetadata, UpdateConfig, UpdateStatus, Updater,
};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Key management and release publishing for self-updating binaries
#[derive(Parser, Debug)]
#[clap(version, about = "Sign and publish releases for safedate self-updates")]
struct Args {
    /// Enable debug logging
    #[clap(short, long, global = true)]
    debug: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an Ed25519 key pair (`<prefix>` and `<prefix>.pub`)
    Keygen {
        /// Prefix for the key files
        prefix: PathBuf,
    },
    /// Sign a message
    Sign {
        /// Private key path (PEM)
        #[clap(short, long, env = "SAFEDATE_PRIVATE_KEY")]
        key: PathBuf,
        /// Message to sign
        message: String,
    },
    /// Verify a signature
    Verify {
        /// Public key path (PEM)
        #[clap(short, long = "pub", env = "SAFEDATE_PUBLIC_KEY")]
        public_key: PathBuf,
        /// Message
        message: String,
        /// Signature (base64) to verify
        signature: String,
    },
    /// Print the public key as a Rust byte-array literal for embedding
    PubkeyBytes {
        /// Public key path (PEM)
        #[clap(short, long = "pub", env = "SAFEDATE_PUBLIC_KEY")]
        public_key: PathBuf,
    },
    /// Print the SHA-256 of a file
    Checksum {
        file: PathBuf,
    },
    /// Compress, checksum and sign a binary, and write its metadata.json
    Release {
        /// Private key path (PEM)
        #[clap(short, long, env = "SAFEDATE_PRIVATE_KEY")]
        key: PathBuf,
        /// Release version, e.g. v1.2.3
        #[clap(long = "version")]
        release_version: String,
        /// Download reference written to the metadata (default: artefact file name)
        #[clap(long)]
        download_url: Option<String>,
        /// Output directory
        #[clap(long, default_value = ".")]
        out_dir: PathBuf,
        /// Binary to publish
        binary: PathBuf,
    },
    /// Ask a metadata endpoint whether a newer release exists
    Check {
        /// URL of metadata.json
        #[clap(long)]
        url: String,
        /// Version to compare against
        #[clap(long)]
        current: String,
        /// Version prefix stripped before comparison
        #[clap(long, default_value = "v")]
        prefix: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    match args.command {
        Command::Keygen { prefix } => keygen(&prefix),
        Command::Sign { key, message } => {
            let signature = signing::sign_file(&key, &message).context("sign failed")?;
            println!("{signature}");
            Ok(())
        }
        Command::Verify {
            public_key,
            message,
            signature,
        } => {
            let valid = signing::verify_file(&public_key, &message, &signature)
                .context("verify failed")?;
            if !valid {
                bail!("invalid signature");
            }
            println!("valid signature");
            Ok(())
        }
        Command::PubkeyBytes { public_key } => {
            let bytes = signing::public_key_from_file(&public_key)
                .context("failed to read public key")?;
            println!("{}", byte_array_literal(&bytes));
            Ok(())
        }
        Command::Checksum { file } => {
            let sum = signing::checksum_file(&file)
                .with_context(|| format!("failed to hash {}", file.display()))?;
            println!("{sum}");
            Ok(())
        }
        Command::Release {
            key,
            release_version,
            download_url,
            out_dir,
            binary,
        } => release(&key, &release_version, download_url, &out_dir, &binary),
        Command::Check {
            url,
            current,
            prefix,
        } => check(url, current, prefix),
    }
}

fn keygen(prefix: &Path) -> Result<()> {
    let mut public = prefix.as_os_str().to_os_string();
    public.push(".pub");
    let public = PathBuf::from(public);

    signing::generate_keys(prefix, &public).context("keygen failed")?;
    println!(
        "Generated key pair:\n  {}\n  {}",
        prefix.display(),
        public.display()
    );
    Ok(())
}

fn byte_array_literal(bytes: &[u8]) -> String {
    let body = bytes
        .iter()
        .map(|b| format!("0x{b:02x}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{body}]")
}

fn release(
    key: &Path,
    version: &str,
    download_url: Option<String>,
    out_dir: &Path,
    binary: &Path,
) -> Result<()> {
    let name = binary
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", binary.display()))?;
    let artifact_name = format!("{name}-{version}.gz");
    let artifact_path = out_dir.join(&artifact_name);

    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let checksum = signing::checksum_file(binary)
        .with_context(|| format!("failed to hash {}", binary.display()))?;
    let signature = signing::sign_file(key, &signing::signed_message(version, &checksum))
        .context("sign failed")?;

    debug!(artifact = %artifact_path.display(), "compressing release");
    let source = File::open(binary).with_context(|| format!("failed to open {}", binary.display()))?;
    let sink = File::create(&artifact_path)
        .with_context(|| format!("failed to create {}", artifact_path.display()))?;
    let mut encoder = GzEncoder::new(BufWriter::new(sink), Compression::best());
    io::copy(&mut BufReader::new(source), &mut encoder).context("failed to compress release")?;
    encoder
        .finish()
        .and_then(|mut writer| writer.flush())
        .context("failed to compress release")?;

    let metadata = ReleaseMetadata {
        version: version.to_string(),
        checksum,
        signature,
        download_url: download_url.unwrap_or(artifact_name),
    };
    let metadata_path = out_dir.join("metadata.json");
    let encoded = serde_json::to_vec_pretty(&metadata)?;
    fs::write(&metadata_path, encoded)
        .with_context(|| format!("failed to write {}", metadata_path.display()))?;

    info!(version, checksum = %metadata.checksum, "release written");
    println!("{}", artifact_path.display());
    println!("{}", metadata_path.display());
    Ok(())
}

fn check(url: String, current: String, prefix: String) -> Result<()> {
    let config = UpdateConfig::new(url, current).with_version_prefix(prefix);
    let fetcher = HttpFetcher::builder()
        .build()
        .context("failed to build HTTP client")?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;

    match runtime.block_on(Updater::new(fetcher, config).has_newer())? {
        UpdateStatus::Available(metadata) => println!("update available: {}", metadata.version),
        UpdateStatus::UpToDate => println!("up to date"),
    }
    Ok(())
}
