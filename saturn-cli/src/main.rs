use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::OsRng;
use saturn_core::config::Config;
use saturn_core::core_identity::{
    export_private_key_pem, export_private_key_raw, export_public_key_pem, export_public_key_raw,
    import_private_key_pem, import_private_key_raw, import_public_key_pem, import_public_key_raw,
    peer_id_from_public_key, KeyPair, PublicKey, RecoverySeed,
};
use saturn_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use saturn_core::repo::{default_repo_path, InitOptions, Repo, CONFIG_FILE};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::Zeroizing;

#[derive(Parser, Debug)]
#[command(name = "saturn")]
#[command(author, version, about = "Saturn node identity tool", long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error); defaults to the repo config
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    /// Repository directory
    #[arg(long, global = true, env = "SATURN_PATH")]
    repo: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a repository and a new node identity
    Init {
        /// RSA modulus size [default: keygen.default_bits, 4096 unless overridden]
        #[arg(short, long)]
        bits: Option<usize>,

        /// Replace an existing repository (its identity is lost)
        #[arg(long)]
        force: bool,

        /// Recovery phrase to derive the identity from
        #[arg(long)]
        phrase: Option<String>,

        /// Passphrase mixed into the recovery phrase
        #[arg(long, requires = "phrase", default_value = "")]
        passphrase: String,

        /// Encrypt the identity key into the keystore with this password
        #[arg(long, env = "SATURN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Print the node's peer id
    Id {
        /// Keystore password, if the key is encrypted
        #[arg(long, env = "SATURN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Export, import and check identity keys
    #[command(subcommand)]
    Key(KeyCommand),
}

#[derive(Subcommand, Debug)]
enum KeyCommand {
    /// Write the node's key
    Export {
        #[arg(short, long, value_enum, default_value_t = KeyFormat::Pem)]
        format: KeyFormat,

        /// Export the public key only
        #[arg(long)]
        public: bool,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keystore password, if the key is encrypted
        #[arg(long, env = "SATURN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Read a key file and print its peer id
    Import {
        file: PathBuf,

        #[arg(short, long, value_enum, default_value_t = KeyFormat::Pem)]
        format: KeyFormat,

        /// The file holds a public key
        #[arg(long)]
        public: bool,
    },

    /// Generate a throwaway key and check every export/import round trip
    Verify {
        #[arg(short, long, default_value_t = 2048)]
        bits: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum KeyFormat {
    /// PEM text block
    Pem,
    /// DER bytes (base64 on stdout)
    Raw,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let repo_path = args.repo.clone().unwrap_or_else(default_repo_path);

    init_logging_with_config(log_config(&args, &repo_path))?;
    debug!(repo = %repo_path.display(), "saturn CLI started");

    match args.command {
        Command::Init {
            bits,
            force,
            phrase,
            passphrase,
            password,
        } => {
            let seed = phrase.map(|phrase| {
                Zeroizing::new(RecoverySeed::from_phrase(&phrase, &passphrase).as_bytes().to_vec())
            });
            let options = InitOptions {
                bits,
                seed,
                force,
                password: password.map(Zeroizing::new),
            };

            println!("initializing saturn node at {}", repo_path.display());
            let repo = Repo::init(&repo_path, options, &mut OsRng)
                .with_context(|| format!("failed to initialize {}", repo_path.display()))?;
            println!("peer identity: {}", repo.identity().peer_id());
        }
        Command::Id { password } => {
            let repo = open_repo(&repo_path, password.as_deref())?;
            println!("{}", repo.identity().peer_id());
        }
        Command::Key(KeyCommand::Export {
            format,
            public,
            output,
            password,
        }) => {
            let repo = open_repo(&repo_path, password.as_deref())?;
            let kp = repo.identity().keypair();
            let bytes = encode_key(kp, format, public, output.is_some())?;
            match output {
                Some(path) => {
                    write_key_file(&path, &bytes, !public)?;
                    info!(path = %path.display(), public, "key exported");
                }
                None => std::io::stdout().write_all(&bytes)?,
            }
        }
        Command::Key(KeyCommand::Import {
            file,
            format,
            public,
        }) => {
            let contents = Zeroizing::new(
                fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?,
            );
            let public_key = if public {
                decode_public_key(&contents, format)?
            } else {
                decode_private_key(&contents, format)?.public_key().clone()
            };
            load_config(&repo_path)?
                .keygen
                .check_public_key(&public_key)?;
            println!("{}", peer_id_from_public_key(&public_key)?);
        }
        Command::Key(KeyCommand::Verify { bits }) => {
            verify_roundtrip(bits)?;
        }
    }

    Ok(())
}

/// The repo's config when there is one, otherwise defaults with `SATURN_*` overrides
fn load_config(repo_path: &Path) -> Result<Config> {
    let config = if Repo::is_initialized(repo_path) {
        Config::from_file(repo_path.join(CONFIG_FILE))?
    } else {
        Config::from_env()?
    };
    Ok(config)
}

/// Flags win; otherwise use the logging section of [`load_config`]
fn log_config(args: &Args, repo_path: &Path) -> LogConfig {
    let base = load_config(repo_path)
        .map(|config| LogConfig::from(&config.logging))
        .unwrap_or_default();

    let json = base.json_format || args.json_logs;
    match args.log_level {
        Some(level) => LogConfig { level, ..base },
        None => base,
    }
    .json_format(json)
}

fn open_repo(path: &Path, password: Option<&str>) -> Result<Repo> {
    Repo::open(path, password).with_context(|| format!("failed to open {}", path.display()))
}

fn encode_key(
    kp: &KeyPair,
    format: KeyFormat,
    public: bool,
    to_file: bool,
) -> Result<Zeroizing<Vec<u8>>> {
    let bytes = match (format, public) {
        (KeyFormat::Pem, true) => Zeroizing::new(export_public_key_pem(kp)?.into_bytes()),
        (KeyFormat::Pem, false) => {
            Zeroizing::new(export_private_key_pem(kp)?.as_bytes().to_vec())
        }
        (KeyFormat::Raw, true) => Zeroizing::new(export_public_key_raw(kp)?),
        (KeyFormat::Raw, false) => export_private_key_raw(kp)?,
    };

    if format == KeyFormat::Raw && !to_file {
        let mut text = STANDARD.encode(&bytes[..]);
        text.push('\n');
        return Ok(Zeroizing::new(text.into_bytes()));
    }
    Ok(bytes)
}

fn write_key_file(path: &Path, bytes: &[u8], private: bool) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if private {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options
        .open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(bytes)?;
    Ok(())
}

/// Raw input is DER, or base64 of DER as printed by `key export --format raw`
fn raw_bytes(contents: &[u8]) -> Zeroizing<Vec<u8>> {
    let decoded = std::str::from_utf8(contents)
        .ok()
        .and_then(|text| STANDARD.decode(text.trim()).ok());
    Zeroizing::new(decoded.unwrap_or_else(|| contents.to_vec()))
}

fn decode_private_key(contents: &[u8], format: KeyFormat) -> Result<KeyPair> {
    let kp = match format {
        KeyFormat::Pem => {
            let text = std::str::from_utf8(contents).context("PEM file is not UTF-8")?;
            import_private_key_pem(text)?
        }
        KeyFormat::Raw => import_private_key_raw(&raw_bytes(contents))?,
    };
    Ok(kp)
}

fn decode_public_key(contents: &[u8], format: KeyFormat) -> Result<PublicKey> {
    let public = match format {
        KeyFormat::Pem => {
            let text = std::str::from_utf8(contents).context("PEM file is not UTF-8")?;
            import_public_key_pem(text)?
        }
        KeyFormat::Raw => import_public_key_raw(&raw_bytes(contents))?,
    };
    Ok(public)
}

fn verify_roundtrip(bits: usize) -> Result<()> {
    println!("generating {}-bit RSA keypair...", bits);
    let kp = KeyPair::generate(bits, &mut OsRng)?;

    let checks: [(&str, bool); 4] = [
        (
            "private PEM",
            import_private_key_pem(&export_private_key_pem(&kp)?)? == kp,
        ),
        (
            "private raw",
            import_private_key_raw(&export_private_key_raw(&kp)?)? == kp,
        ),
        (
            "public PEM",
            &import_public_key_pem(&export_public_key_pem(&kp)?)? == kp.public_key(),
        ),
        (
            "public raw",
            &import_public_key_raw(&export_public_key_raw(&kp)?)? == kp.public_key(),
        ),
    ];

    let mut failed = 0;
    for (name, ok) in checks {
        println!("{:<12} {}", name, if ok { "ok" } else { "MISMATCH" });
        if !ok {
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} of {} round trips failed", failed, checks.len());
    }
    println!("peer identity: {}", peer_id_from_public_key(kp.public_key())?);
    Ok(())
}
