use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxeval::{
    write_json_results, write_markdown_report, CommandSpeech, CommandSpeechConfig, Judge,
    LlmJudge, LlmJudgeConfig, LoopbackSpeech, RuleJudge, RunSummary, Simulator, SimulatorConfig,
    Synthesizer, ToolRegistry, Transcriber,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum JudgeMode {
    Rules,
    Llm,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SpeechMode {
    /// External TTS/ASR programs
    Command,
    /// Text written to the audio file and read back verbatim
    Loopback,
}

#[derive(Parser)]
#[command(name = "voxeval")]
#[command(about = "Simulate scripted voice conversations and grade the bot replies")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario file in a directory
    Scenarios(ScenariosArgs),
    /// Print the decision tool catalog as JSON
    Tools,
}

#[derive(clap::Args)]
struct ScenariosArgs {
    /// Path to scenarios directory
    path: PathBuf,

    /// Output report path
    #[arg(long, default_value = "out/report.md")]
    report: PathBuf,

    /// Audio output directory
    #[arg(long, default_value = "out/audio")]
    audio_dir: PathBuf,

    /// ASR model size
    #[arg(long, default_value = "tiny")]
    model: String,

    /// Evaluation method
    #[arg(long, value_enum, default_value = "rules")]
    judge: JudgeMode,

    /// Speech backend
    #[arg(long, value_enum, default_value = "command")]
    speech: SpeechMode,

    /// Also write machine-readable results here
    #[arg(long)]
    json: Option<PathBuf>,

    /// Scenarios to run at the same time
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Per-call limit for the speech programs, in seconds
    #[arg(long, default_value_t = 120)]
    speech_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Tools => {
            let definitions = ToolRegistry::standard()?.definitions();
            println!("{}", serde_json::to_string_pretty(&definitions)?);
            Ok(())
        }
        Command::Scenarios(args) => run_scenarios(args).await,
    }
}

async fn run_scenarios(args: ScenariosArgs) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = args.report.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::create_dir_all(&args.audio_dir)?;

    let (synthesizer, transcriber): (Arc<dyn Synthesizer>, Arc<dyn Transcriber>) = match args.speech {
        SpeechMode::Command => {
            let config = CommandSpeechConfig::new(args.model.clone())
                .with_timeout(Duration::from_secs(args.speech_timeout));
            let speech = Arc::new(CommandSpeech::new(config)?);
            (speech.clone(), speech)
        }
        SpeechMode::Loopback => {
            let speech = Arc::new(LoopbackSpeech::new());
            (speech.clone(), speech)
        }
    };

    let judge: Arc<dyn Judge> = match args.judge {
        JudgeMode::Rules => Arc::new(RuleJudge::new()),
        JudgeMode::Llm => Arc::new(LlmJudge::new(LlmJudgeConfig::from_env())?),
    };

    let config = SimulatorConfig::new(&args.audio_dir).with_concurrency(args.concurrency);
    let simulator = Simulator::new(synthesizer, transcriber, judge, config)?;

    let results = simulator.run_directory(&args.path).await?;

    write_markdown_report(&results, &args.report)?;
    if let Some(json) = &args.json {
        write_json_results(&results, json)?;
    }

    let summary = RunSummary::from_results(&results);
    println!("{}/{} scenarios passed", summary.passed, summary.total);
    println!("Report written to: {}", args.report.display());

    if summary.all_passed() {
        std::process::exit(0);
    } else {
        std::process::exit(1);
    }
}
