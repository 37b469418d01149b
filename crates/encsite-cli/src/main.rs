//! encsite: encrypted static site CLI
//!
//! Commands:
//!   encrypt -i <in> -o <out>   - seal a site tree into its `enc/` counterpart
//!   selftest                   - encrypt/decrypt consistency check
//!   decrypt <asset>            - open a single encrypted asset
//!   verify <out>               - audit an encrypted tree against its manifest
//!   preview <path>             - serve one request through the engine
//!   credential set|clear|status
//!   config show                - display the effective configuration

mod key;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::ExposeSecret;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use encsite_bootstrap::CredentialStore;
use encsite_core::SiteConfig;
use encsite_engine::{ContentRequest, Engine, FetchOutcome, Message, OperatorSource, Reply};
use encsite_publish::{EncryptOptions, ProgressFn};

use crate::key::KeyArgs;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "encsite",
    version,
    about = "Encrypted static site toolkit",
    long_about = "encsite: encrypt a static site, audit the result, and preview it through the decrypting engine"
)]
struct Cli {
    /// Path to encsite.toml configuration file
    #[arg(long, short = 'c', env = "ENCSITE_CONFIG", default_value = "encsite.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "ENCSITE_LOG")]
    log: Option<String>,

    /// Log format (json, text)
    #[arg(long, env = "ENCSITE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a directory of static assets
    Encrypt {
        /// Input directory containing plain assets
        #[arg(long = "in", short = 'i')]
        input: PathBuf,
        /// Output directory for encrypted files (served as the site's enc/ root)
        #[arg(long = "out", short = 'o')]
        output: PathBuf,
        #[command(flatten)]
        key: KeyArgs,
        /// Clean output directory before encryption
        #[arg(long)]
        clean: bool,
        /// Generate a manifest in the output directory
        #[arg(long, short = 'm')]
        manifest: bool,
    },

    /// Run a self-test to verify encryption/decryption consistency
    Selftest {
        /// Test key string
        #[arg(long, short = 'k', default_value = "test-key-12345")]
        key: String,
    },

    /// Decrypt a single asset (for auditing)
    Decrypt {
        /// Encrypted asset (*.enc)
        asset: PathBuf,
        /// Write plaintext here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Check an encrypted tree against its manifest
    Verify {
        /// Encryptor output directory
        dir: PathBuf,
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Serve one request through the engine, as a browser would see it
    Preview {
        /// Request path, e.g. /index.html
        path: String,
        /// Site root on disk (holds enc/)
        #[arg(long, conflicts_with = "remote")]
        root: Option<PathBuf>,
        /// Static host base URL to fetch ciphertext from
        #[arg(long)]
        remote: Option<String>,
        #[command(flatten)]
        key: KeyArgs,
        /// Write the response body here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Manage the persisted key credential
    Credential {
        #[command(subcommand)]
        action: CredentialAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum CredentialAction {
    /// Persist a key
    Set {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Remove the persisted key
    Clear,
    /// Report whether a usable key is persisted
    Status,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SiteConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;
    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.logging.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);
    if !cli.config.exists() {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    match cli.command {
        Commands::Encrypt {
            input,
            output,
            key,
            clean,
            manifest,
        } => cmd_encrypt(&config, &input, &output, &key, clean, manifest),
        Commands::Selftest { key } => cmd_selftest(&key),
        Commands::Decrypt { asset, output, key } => cmd_decrypt(&config, &asset, output.as_deref(), &key),
        Commands::Verify { dir, key } => cmd_verify(&config, &dir, &key),
        Commands::Preview {
            path,
            root,
            remote,
            key,
            output,
        } => {
            cmd_preview(
                &config,
                &path,
                root.as_deref(),
                remote.as_deref(),
                &key,
                output.as_deref(),
            )
            .await
        }
        Commands::Credential { action } => cmd_credential(&config, action),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

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

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) =
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

// ── `encsite encrypt` ─────────────────────────────────────────────────────────

fn cmd_encrypt(
    config: &SiteConfig,
    input: &Path,
    output: &Path,
    key: &KeyArgs,
    clean: bool,
    manifest: bool,
) -> Result<()> {
    let passphrase = key.resolve()?;
    info!(key_len = passphrase.expose_secret().len(), "encryption key resolved");

    println!("Input directory:  {}", input.display());
    println!("Output directory: {}", output.display());

    let options = EncryptOptions {
        clean,
        manifest,
        ..EncryptOptions::from_config(&config.encryptor)
    };

    let pb = make_progress_bar(0, "encrypt");
    let pb_clone = pb.clone();
    let progress: ProgressFn = Box::new(move |done, total, path| {
        pb_clone.set_length(total);
        pb_clone.set_position(done);
        pb_clone.set_message(path.to_string());
    });

    let summary = encsite_publish::encrypt_directory_with_progress(
        input,
        output,
        passphrase.expose_secret(),
        &options,
        Some(&progress),
    )
    .with_context(|| format!("encrypting {}", input.display()))?;
    pb.finish_with_message("done".to_string());

    println!();
    println!("Encryption complete:");
    println!(
        "  encrypted: {} files ({} → {})",
        summary.files_encrypted,
        fmt_bytes(summary.bytes_in),
        fmt_bytes(summary.bytes_out)
    );
    println!("  skipped:   {} files (not on the publish list)", summary.files_skipped);
    if let Some(path) = &summary.manifest_path {
        println!("  manifest:  {}", path.display());
    }
    Ok(())
}

// ── `encsite selftest` ────────────────────────────────────────────────────────

fn cmd_selftest(key: &str) -> Result<()> {
    println!("Running encryption/decryption test...");
    let sizes = encsite_publish::self_test(key)?;
    for (i, size) in sizes.iter().enumerate() {
        println!("  ✓ test {} passed ({} bytes)", i + 1, size);
    }
    println!("All tests passed!");
    Ok(())
}

// ── `encsite decrypt` ─────────────────────────────────────────────────────────

fn cmd_decrypt(config: &SiteConfig, asset: &Path, output: Option<&Path>, key: &KeyArgs) -> Result<()> {
    let passphrase = key.resolve_or_stored(config)?;
    let data = std::fs::read(asset).with_context(|| format!("reading {}", asset.display()))?;
    let plaintext = encsite_crypto::decrypt(&data, passphrase.expose_secret())
        .with_context(|| format!("decrypting {}", asset.display()))?;

    match output {
        Some(path) => {
            std::fs::write(path, &plaintext)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("{} bytes → {}", plaintext.len(), path.display());
        }
        None => std::io::stdout()
            .write_all(&plaintext)
            .context("writing to stdout")?,
    }
    Ok(())
}

// ── `encsite verify` ──────────────────────────────────────────────────────────

fn cmd_verify(config: &SiteConfig, dir: &Path, key: &KeyArgs) -> Result<()> {
    let passphrase = key.resolve_or_stored(config)?;
    let report = encsite_publish::verify_directory(
        dir,
        passphrase.expose_secret(),
        &config.encryptor.manifest_name,
    )?;

    for (path, reason) in &report.failures {
        println!("  ✗ {path}: {reason}");
    }
    println!(
        "Checked {} files, {} failed",
        report.checked,
        report.failures.len()
    );
    if !report.is_ok() {
        anyhow::bail!("{} files failed verification", report.failures.len());
    }
    Ok(())
}

// ── `encsite preview` ─────────────────────────────────────────────────────────

async fn cmd_preview(
    config: &SiteConfig,
    path: &str,
    root: Option<&Path>,
    remote: Option<&str>,
    key: &KeyArgs,
    output: Option<&Path>,
) -> Result<()> {
    let source = match (root, remote) {
        (_, Some(endpoint)) => OperatorSource::http(endpoint)?,
        (Some(root), None) => OperatorSource::local_dir(root)?,
        (None, None) => OperatorSource::local_dir(&std::env::current_dir()?)?,
    };
    let engine = Engine::new(config, source)?;

    match key.resolve_or_stored(config) {
        Ok(passphrase) => {
            let reply = engine.handle_message(Message::SetKey {
                key: passphrase.expose_secret().to_string(),
            });
            if reply != Some(Reply::KeySet { success: true }) {
                anyhow::bail!("engine rejected the key");
            }
        }
        Err(e) => warn!("previewing without a key: {e:#}"),
    }

    let url = format!(
        "{}/{}",
        config.site.origin.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let request = ContentRequest::parse(&url).with_context(|| format!("bad request URL: {url}"))?;

    let response = match engine.handle_fetch(&request).await {
        FetchOutcome::PassThrough => {
            eprintln!("pass-through: the engine would not intercept {path}");
            return Ok(());
        }
        FetchOutcome::Respond(response) => response,
    };

    eprintln!("{}", response.status());
    for (name, value) in response.headers() {
        eprintln!("{name}: {}", value.to_str().unwrap_or("<binary>"));
    }
    match output {
        Some(out) => std::fs::write(out, response.body())
            .with_context(|| format!("writing {}", out.display()))?,
        None => std::io::stdout()
            .write_all(response.body())
            .context("writing to stdout")?,
    }
    Ok(())
}

// ── `encsite credential` ──────────────────────────────────────────────────────

fn cmd_credential(config: &SiteConfig, action: CredentialAction) -> Result<()> {
    let store = key::credential_store(config)?;
    match action {
        CredentialAction::Set { key } => {
            let passphrase = key.resolve()?;
            store.store(&passphrase)?;
            println!("Key stored in {}", store.path().display());
        }
        CredentialAction::Clear => {
            store.clear()?;
            println!("Key removed from {}", store.path().display());
        }
        CredentialAction::Status => match store.load()? {
            Some(_) => println!("Key present ({})", store.path().display()),
            None => println!("No usable key ({})", store.path().display()),
        },
    }
    Ok(())
}

// ── `encsite config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &SiteConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
