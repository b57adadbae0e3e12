//! vibe-metre - Metre and bar scheduling for VibeLang
//!
//! Renders Rhai performance scripts to a beat schedule, plays them in real
//! time, and inspects metre trees.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::unbounded;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use vibelang_metre::{
    api::{create_engine, init_api},
    config::Config,
    schedule, MetreSpec, MicroTimingStyle, Performer, PhaseRegistry, RationalDuration,
    RealtimePerformer, ScheduledSound, SubdivisionTree, SynchronisedMetre, TransportClock,
    VirtualPerformer,
};

#[derive(Parser)]
#[command(name = "vibe-metre")]
#[command(author, version, about = "Metre and bar scheduling for VibeLang", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ~/.config/vibe-metre/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scripts offline, each on its own thread, and print the merged schedule
    Render {
        /// Rhai scripts to run
        #[arg(required = true)]
        scripts: Vec<PathBuf>,

        /// Tempo in beats per minute
        #[arg(long)]
        bpm: Option<f64>,

        /// Beat each script starts at, in script order (missing entries start at 0)
        #[arg(long, value_delimiter = ',')]
        start_beat: Vec<f64>,
    },
    /// Run a script in real time, printing each sound as it happens
    Run {
        script: PathBuf,

        /// Tempo in beats per minute
        #[arg(long)]
        bpm: Option<f64>,
    },
    /// Print the subdivision tree of a metre
    Tree {
        /// Time signature or bracket notation, e.g. "6/8" or "[[1/2,1/2],[1/2,1/2,1/2]]"
        metre: String,

        /// Show the micro-timing shifts of a style
        #[arg(long)]
        style: Option<String>,
    },
    /// List micro-timing styles
    Styles,
    /// Create a default configuration file
    Init,
    /// Show the configuration file path
    ConfigPath,
}

/// Settings shared by every script thread.
#[derive(Clone)]
struct ScriptSetup {
    beats_per_quarter: RationalDuration,
    default_metre: Option<MetreSpec>,
    default_style: Option<String>,
}

impl ScriptSetup {
    fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            beats_per_quarter: config.beats_per_quarter()?,
            default_metre: config.default_metre()?,
            default_style: config.metre.style.clone(),
        })
    }

    /// Bind `performer` to this thread's scripts and install the default metre.
    fn prepare(&self, performer: Arc<dyn Performer>) -> vibelang_metre::Result<()> {
        init_api(Arc::clone(&performer));
        if let Some(spec) = &self.default_metre {
            schedule::use_metre(performer.as_ref(), spec, self.default_style.as_deref())?;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let path = Config::create_default_config_file()?;
            println!("Created default config at: {}", path.display());
            return Ok(());
        }
        Commands::ConfigPath => {
            let path = Config::config_path()?;
            println!("{}", path.display());
            return Ok(());
        }
        Commands::Styles => {
            for style in MicroTimingStyle::ALL {
                println!("{:<16} {}", style.name(), style.description());
            }
            return Ok(());
        }
        Commands::Tree { metre, style } => return print_tree(&metre, style.as_deref()),
        _ => {}
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_or_default(),
    };
    let setup = ScriptSetup::from_config(&config)?;

    match cli.command {
        Commands::Render {
            scripts,
            bpm,
            start_beat,
        } => render(
            &scripts,
            bpm.unwrap_or(config.tempo.bpm),
            &start_beat,
            &setup,
            config.render.precision,
        ),
        Commands::Run { script, bpm } => run(&script, bpm.unwrap_or(config.tempo.bpm), &setup),
        _ => Ok(()),
    }
}

fn print_tree(metre: &str, style: Option<&str>) -> Result<()> {
    let spec: MetreSpec = metre.parse()?;
    let tree = SubdivisionTree::parse(&spec)?;
    print!("{}", tree.render());

    if let Some(style) = style {
        let registry = PhaseRegistry::new();
        let metre = SynchronisedMetre::with_registry(&spec, Some(style), &registry)?;
        println!();
        println!("{} shifts (quarter lengths):", metre);
        let deepest = tree.tier(tree.max_depth()).unwrap_or_default();
        for node in deepest {
            let shift = metre.get_timing(&node.start);
            if !shift.is_zero() {
                println!("  at {:<6} {}", node.start.to_string(), shift);
            }
        }
    }
    Ok(())
}

fn read_script(path: &PathBuf) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading script {}", path.display()))
}

fn render(
    scripts: &[PathBuf],
    bpm: f64,
    start_beats: &[f64],
    setup: &ScriptSetup,
    precision: usize,
) -> Result<()> {
    let clock = TransportClock::new(bpm);
    let (tx, rx) = unbounded();

    let mut handles = Vec::new();
    for (index, path) in scripts.iter().enumerate() {
        let source = read_script(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("script{}", index));
        let start = start_beats.get(index).copied().unwrap_or(0.0);
        let setup = setup.clone();
        let tx = tx.clone();

        handles.push(thread::spawn(move || {
            let performer = Arc::new(
                VirtualPerformer::starting_at(start)
                    .with_beats_per_quarter(setup.beats_per_quarter.clone()),
            );
            let outcome = setup
                .prepare(performer.clone())
                .map_err(|e| e.to_string())
                .and_then(|_| create_engine().run(&source).map_err(|e| e.to_string()));
            log::debug!("[RENDER] {} finished at beat {:.3}", name, performer.current_beat());
            let _ = tx.send((index, name, outcome.map(|_| performer.take_events())));
        }));
    }
    drop(tx);

    let mut rows: Vec<(usize, String, ScheduledSound)> = Vec::new();
    let mut failures = 0;
    for (index, name, outcome) in rx.iter() {
        match outcome {
            Ok(events) => rows.extend(events.into_iter().map(|e| (index, name.clone(), e))),
            Err(message) => {
                eprintln!("{}: {}", name, message);
                failures += 1;
            }
        }
    }
    for handle in handles {
        if handle.join().is_err() {
            failures += 1;
        }
    }

    rows.sort_by(|a, b| a.2.beat.total_cmp(&b.2.beat).then(a.0.cmp(&b.0)));
    println!("{:>10} {:>10}  {:<12} sound", "beat", "seconds", "thread");
    for (_, name, event) in &rows {
        let options: Vec<String> = event
            .options
            .iter()
            .map(|(key, value)| format!("{}:{}", key, value))
            .collect();
        println!(
            "{:>10.prec$} {:>10.prec$}  {:<12} {} {}",
            event.beat,
            event.beat * clock.seconds_per_beat(),
            name,
            event.sound,
            options.join(" "),
            prec = precision
        );
    }

    if failures > 0 {
        Err(anyhow!("{} of {} scripts failed", failures, scripts.len()))
    } else {
        Ok(())
    }
}

fn run(script: &PathBuf, bpm: f64, setup: &ScriptSetup) -> Result<()> {
    let source = read_script(script)?;
    let clock = Arc::new(TransportClock::new(bpm));
    let performer = Arc::new(
        RealtimePerformer::new(clock)
            .with_beats_per_quarter(setup.beats_per_quarter.clone())
            .with_sink(Box::new(|event: &ScheduledSound| println!("{}", event))),
    );
    setup.prepare(performer)?;
    create_engine()
        .run(&source)
        .map_err(|e| anyhow!("{}: {}", script.display(), e))
}
