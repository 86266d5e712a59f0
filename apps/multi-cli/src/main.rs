use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use multi_core::{
    BackupPrompt, Choice, Disposition, FirmwareAnalysis, Outcome, Stm32EepromLocator, ToolConfig,
    check_firmware_file_size, extract_backup,
};
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-protocol module firmware tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the signature and validation report of a firmware file
    Info {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Check that a firmware file fits the module flash
    Check { file: PathBuf },
    /// Extract the firmware from a flash backup
    Extract {
        backup: PathBuf,
        /// Keep the EEPROM region
        #[arg(long, conflicts_with = "exclude_eeprom")]
        include_eeprom: bool,
        /// Drop the EEPROM region
        #[arg(long)]
        exclude_eeprom: bool,
        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Markdown,
}

/// Answers extraction questions from flags, config, or stdin.
struct CliPrompt {
    include_eeprom: Option<bool>,
    output: Option<PathBuf>,
}

fn ask(question: &str) -> Option<String> {
    eprint!("{} ", question);
    io::stderr().flush().ok()?;
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

impl BackupPrompt for CliPrompt {
    fn include_eeprom(&self) -> Choice {
        if let Some(include) = self.include_eeprom {
            return if include { Choice::Yes } else { Choice::No };
        }
        loop {
            let Some(answer) = ask("Include EEPROM data? [y]es/[n]o/[c]ancel:") else {
                return Choice::Cancel;
            };
            if let Some(choice) = parse_choice(&answer) {
                return choice;
            }
        }
    }

    fn destination(&self, suggested: &Path) -> Option<PathBuf> {
        if let Some(path) = &self.output {
            return Some(path.clone());
        }
        let answer = ask(&format!(
            "Save firmware as [{}] (\"-\" to cancel):",
            suggested.display()
        ))?;
        parse_destination(&answer, suggested)
    }
}

/// Empty answer cancels; `None` means ask again.
fn parse_choice(answer: &str) -> Option<Choice> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(Choice::Yes),
        "n" | "no" => Some(Choice::No),
        "" | "c" | "cancel" => Some(Choice::Cancel),
        _ => None,
    }
}

/// Empty answer takes the suggested path, `-` cancels.
fn parse_destination(answer: &str, suggested: &Path) -> Option<PathBuf> {
    match answer.trim() {
        "-" => None,
        "" => Some(suggested.to_path_buf()),
        path => Some(PathBuf::from(path)),
    }
}

fn init_tracing(verbose: bool, config: &ToolConfig) {
    let default: tracing_subscriber::filter::Directive = if verbose {
        tracing::Level::DEBUG.into()
    } else {
        tracing::Level::INFO.into()
    };
    let builder = tracing_subscriber::EnvFilter::builder().with_default_directive(default);
    let filter = match (&config.log_level, verbose, std::env::var_os("RUST_LOG")) {
        (Some(level), false, None) => builder.parse_lossy(level),
        _ => builder.from_env_lossy(),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn report(outcome: &Outcome) -> i32 {
    match outcome.disposition {
        Disposition::Success => {
            println!("{}", outcome.message);
            0
        }
        Disposition::Failed => {
            error!("{}", outcome.message);
            1
        }
        Disposition::Cancelled => 0,
    }
}

fn run(args: Args, config: ToolConfig) -> Result<i32> {
    let eeprom = Stm32EepromLocator;

    let code = match args.command {
        Commands::Info { file, format } => {
            let analysis = FirmwareAnalysis::analyze(&file, &eeprom)?;
            match format {
                Format::Text => print!("{}", analysis.to_text()),
                Format::Markdown => print!("{}", analysis.to_markdown()),
            }
            if analysis.is_valid() { 0 } else { 1 }
        }
        Commands::Check { file } => {
            let outcome = Outcome::from_result(check_firmware_file_size(&file, &eeprom), |c| {
                format!("Firmware file fits ({} bytes maximum).", c.maximum())
            });
            report(&outcome)
        }
        Commands::Extract {
            backup,
            include_eeprom,
            exclude_eeprom,
            output,
        } => {
            let include = match (include_eeprom, exclude_eeprom) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => config.include_eeprom,
            };
            let output = output.or_else(|| {
                let name = backup
                    .file_stem()
                    .map(|s| format!("{}_firmware.bin", s.to_string_lossy()))?;
                config.output_path(&name)
            });
            debug!(?include, ?output, "Extraction options");

            let prompt = CliPrompt {
                include_eeprom: include,
                output,
            };
            let outcome = Outcome::from_result(extract_backup(&backup, &prompt), |e| e.message());
            report(&outcome)
        }
    };

    Ok(code)
}

fn main() {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match ToolConfig::load_from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => ToolConfig::default(),
    };

    init_tracing(args.verbose, &config);
    info!("Starting multi-fw...");

    match run(args, config) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
