//! RepSense CLI - Command-line interface for the RepSense coaching engine
//!
//! Commands:
//! - analyze: Run the frame pipeline over recorded pose frames (batch mode)
//! - coach: Drive a full coaching session over recorded frames
//! - templates: List the exercise template catalog
//! - config: Print the default session configuration
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use repsense::config::CoachConfig;
use repsense::error::CoachError;
use repsense::landmarks::PoseFrame;
use repsense::pipeline::{analyze_frames, PipelineOutput};
use repsense::session::{CoachSession, SessionSummary};
use repsense::storage::{CoachStore, InMemoryStore, JsonLinesStore};
use repsense::template::ExerciseTemplate;
use repsense::voice::{SpeechCapability, Utterance};
use repsense::{ENGINE_VERSION, PRODUCER_NAME};

/// RepSense - On-device real-time exercise form coaching
#[derive(Parser)]
#[command(name = "repsense")]
#[command(author = "RepSense Contributors")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Turn pose landmark streams into technique, risk and spoken cues", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the frame pipeline over recorded frames (batch mode)
    Analyze {
        /// Input file of NDJSON pose frames (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Exercise template key
        #[arg(short, long, default_value = "squat")]
        template: String,

        /// Session configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Drive a full coaching session over recorded frames
    Coach {
        /// Input file of NDJSON pose frames (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Exercise template key
        #[arg(short, long, default_value = "squat")]
        template: String,

        /// Session owner recorded with the session
        #[arg(long, default_value = "local")]
        owner: String,

        /// Session configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write session rows as JSON lines to this file
        #[arg(long)]
        rows: Option<PathBuf>,

        /// Print spoken cues to stderr
        #[arg(long)]
        speak: bool,
    },

    /// List the exercise template catalog
    Templates {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default session configuration as JSON
    Config,

    /// Diagnose configuration and environment
    Doctor {
        /// Check a session configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one pipeline output per line)
    Ndjson,
    /// JSON array of pipeline outputs
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repsense=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), RepSenseCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            output,
            template,
            config,
            output_format,
        } => cmd_analyze(&input, &output, &template, config.as_deref(), output_format),

        Commands::Coach {
            input,
            template,
            owner,
            config,
            rows,
            speak,
        } => cmd_coach(&input, &template, &owner, config.as_deref(), rows.as_deref(), speak),

        Commands::Templates { json } => cmd_templates(json),

        Commands::Config => {
            println!("{}", CoachConfig::default().to_json()?);
            Ok(())
        }

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn cmd_analyze(
    input: &Path,
    output: &Path,
    template: &str,
    config: Option<&Path>,
    output_format: OutputFormat,
) -> Result<(), RepSenseCliError> {
    let config = load_config(config)?;
    let frames = read_frames(input)?;

    let outputs = analyze_frames(template, &frames, &config)?;
    let rendered = format_output(&outputs, &output_format)?;

    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        write!(stdout, "{}", rendered)?;
        stdout.flush()?;
    } else {
        fs::write(output, rendered)?;
    }

    Ok(())
}

fn cmd_coach(
    input: &Path,
    template: &str,
    owner: &str,
    config: Option<&Path>,
    rows: Option<&Path>,
    speak: bool,
) -> Result<(), RepSenseCliError> {
    let config = load_config(config)?;
    let frames = read_frames(input)?;

    let store: Arc<dyn CoachStore> = match rows {
        Some(path) => Arc::new(JsonLinesStore::new(File::create(path)?)),
        None => Arc::new(InMemoryStore::new()),
    };
    let speech: Box<dyn SpeechCapability> = Box::new(StderrSpeech { enabled: speak });

    let mut session = CoachSession::start(owner, template, config, store, speech)?;
    for frame in &frames {
        session.on_frame(frame)?;
        // Recorded input has no audio clock; treat every cue as finished once the frame is done
        while session.scheduler().is_speaking() {
            session.on_utterance_complete();
        }
    }

    let summary = session.end()?;
    print_summary(&summary)?;
    Ok(())
}

fn cmd_templates(json: bool) -> Result<(), RepSenseCliError> {
    let catalog = ExerciseTemplate::catalog();

    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
    } else {
        println!("Exercise Templates");
        println!("==================");
        for template in &catalog {
            println!("  {:<16} {}", template.key, template.name);
            println!(
                "      knee {:.0}-{:.0}  hip {:.0}-{:.0}  spine {:.0}-{:.0}  shoulder {:.0}-{:.0}",
                template.ranges.knee.min,
                template.ranges.knee.max,
                template.ranges.hip.min,
                template.ranges.hip.max,
                template.ranges.spine.min,
                template.ranges.spine.max,
                template.ranges.shoulder.min,
                template.ranges.shoulder.max,
            );
        }
    }

    Ok(())
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), RepSenseCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("RepSense version {}", ENGINE_VERSION),
    });

    checks.push(DoctorCheck {
        name: "templates".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} exercise templates available", ExerciseTemplate::catalog().len()),
    });

    if let Some(config_path) = config {
        if config_path.exists() {
            match fs::read_to_string(config_path) {
                Ok(content) => match CoachConfig::from_json(&content) {
                    Ok(parsed) => checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Configuration valid ({} mode, every {} frames)",
                            parsed.performance_mode.as_str(),
                            parsed.performance_mode.decimation()
                        ),
                    }),
                    Err(e) => checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Invalid configuration: {}", e),
                    }),
                },
                Err(e) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read configuration file: {}", e),
                }),
            }
        } else {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Configuration file does not exist, defaults apply".to_string(),
            });
        }
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (frame streaming ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("RepSense Doctor Report");
        println!("======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(RepSenseCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn load_config(path: Option<&Path>) -> Result<CoachConfig, RepSenseCliError> {
    match path {
        Some(path) => Ok(CoachConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(CoachConfig::default()),
    }
}

fn read_frames(input: &Path) -> Result<Vec<PoseFrame>, RepSenseCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let frames = PoseFrame::parse_ndjson(&input_data)?;
    if frames.is_empty() {
        return Err(RepSenseCliError::NoFrames);
    }
    Ok(frames)
}

fn format_output(outputs: &[PipelineOutput], format: &OutputFormat) -> Result<String, RepSenseCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for output in outputs {
                lines.push(serde_json::to_string(output)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(outputs)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(outputs)?),
    }
}

fn print_summary(summary: &SessionSummary) -> Result<(), RepSenseCliError> {
    let mut stdout = io::stdout();
    writeln!(stdout, "{}", serde_json::to_string_pretty(summary)?)?;
    stdout.flush()?;
    Ok(())
}

/// Speech engine for recorded sessions: prints cue text instead of speaking
struct StderrSpeech {
    enabled: bool,
}

impl SpeechCapability for StderrSpeech {
    fn speak(&mut self, utterance: &Utterance) -> Result<(), CoachError> {
        if self.enabled {
            eprintln!("[cue] {}", utterance.text);
        }
        Ok(())
    }

    fn cancel(&mut self) {}
}

// Error types

#[derive(Debug, thiserror::Error)]
enum RepSenseCliError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Coach(#[from] CoachError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("No frames found in input")]
    NoFrames,

    #[error("One or more health checks failed")]
    DoctorFailed,
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RepSenseCliError> for CliError {
    fn from(e: RepSenseCliError) -> Self {
        let message = e.to_string();
        match e {
            RepSenseCliError::Io(_) => CliError {
                code: "IO_ERROR".to_string(),
                message,
                hint: Some("Check file paths and permissions".to_string()),
            },
            RepSenseCliError::Coach(CoachError::UnknownTemplate(_)) => CliError {
                code: "UNKNOWN_TEMPLATE".to_string(),
                message,
                hint: Some("Run 'repsense templates' for the available keys".to_string()),
            },
            RepSenseCliError::Coach(CoachError::ConfigError(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message,
                hint: Some("Run 'repsense doctor --config <file>' for details".to_string()),
            },
            RepSenseCliError::Coach(CoachError::InvalidFrame(_)) => CliError {
                code: "INVALID_FRAME".to_string(),
                message,
                hint: Some("Each line must be one pose frame with 33 landmarks".to_string()),
            },
            RepSenseCliError::Coach(_) => CliError {
                code: "COACH_ERROR".to_string(),
                message,
                hint: None,
            },
            RepSenseCliError::Json(_) => CliError {
                code: "JSON_ERROR".to_string(),
                message,
                hint: Some("Check JSON syntax".to_string()),
            },
            RepSenseCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message,
                hint: Some("Ensure input file is not empty".to_string()),
            },
            RepSenseCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message,
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
