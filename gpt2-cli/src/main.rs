use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use gpt2_checkpoint::{CheckpointLoader, GPT2Config, ParameterLayout};
use log::{error, info};

/// Hyperparameter flags accepted by the params subcommand.
const HYPERPARAMETERS: [(&str, &str, fn(&mut GPT2Config, usize)); 6] = [
    ("max-seq-len", "Maximum sequence length", |c, v| c.max_seq_len = v),
    ("vocab-size", "Vocabulary size", |c, v| c.vocab_size = v),
    ("padded-vocab-size", "Vocabulary size padded for the embedding table", |c, v| c.padded_vocab_size = v),
    ("num-layers", "Number of transformer blocks", |c, v| c.num_layers = v),
    ("num-heads", "Number of attention heads", |c, v| c.num_heads = v),
    ("channels", "Hidden width", |c, v| c.channels = v),
];

/// Define the inspect subcommand.
fn inspect_subcommand() -> Command {
    Command::new("inspect")
        .about("Load a GPT-2 checkpoint and print its configuration and layout")
        .arg(Arg::new("checkpoint").help("Model checkpoint file").required(true).index(1))
        .arg(
            Arg::new("strict")
                .long("strict")
                .help("Fail if the file has bytes after the parameter section")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("tensors")
                .short('t')
                .long("tensors")
                .help("Print name, offset and size of every tensor")
                .action(ArgAction::SetTrue),
        )
}

/// Define the params subcommand.
fn params_subcommand() -> Command {
    let command = Command::new("params")
        .about("Compute the parameter count of a configuration without loading a checkpoint")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file, (default) = GPT-2 small"),
        );

    HYPERPARAMETERS.iter().fold(command, |command, &(name, help, _)| {
        command.arg(
            Arg::new(name).long(name).value_name("INT").help(help).value_parser(clap::value_parser!(usize)),
        )
    })
}

/// Run the inspect command with the provided arguments
fn run_inspect_command(matches: &ArgMatches) -> Result<()> {
    let checkpoint = matches
        .get_one::<String>("checkpoint")
        .ok_or_else(|| anyhow::anyhow!("checkpoint is required"))?;

    let model = CheckpointLoader::new(checkpoint)
        .with_strict_size(matches.get_flag("strict"))
        .load()
        .map_err(|e| anyhow::anyhow!("Failed to load {checkpoint}: {e}"))?;

    print_config(model.config());
    info!("🔢 Parameters: {}", model.num_parameters());

    if matches.get_flag("tensors") {
        print_tensors(model.layout());
    }

    Ok(())
}

/// Resolves the configuration of the params command: a JSON file or GPT-2 small, then per-field overrides.
fn params_config(matches: &ArgMatches) -> Result<GPT2Config> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => GPT2Config::from_json_file(path)?,
        None => GPT2Config::default(),
    };

    for (name, _, set) in HYPERPARAMETERS {
        if let Some(&value) = matches.get_one::<usize>(name) {
            set(&mut config, value);
        }
    }

    Ok(config)
}

/// Run the params command with the provided arguments
fn run_params_command(matches: &ArgMatches) -> Result<()> {
    let config = params_config(matches)?;

    print_config(&config);
    info!("🔢 Parameters: {}", config.num_parameters()?);
    info!("💾 Size: {} bytes", config.parameter_bytes()?);

    Ok(())
}

fn print_config(config: &GPT2Config) {
    info!("max_seq_len: {}", config.max_seq_len);
    info!("vocab_size: {}", config.vocab_size);
    info!("padded_vocab_size: {}", config.padded_vocab_size);
    info!("num_layers: {}", config.num_layers);
    info!("num_heads: {}", config.num_heads);
    info!("channels: {}", config.channels);
}

fn print_tensors(layout: &ParameterLayout) {
    info!("");
    info!("{:<24} {:>12} {:>12}", "name", "offset", "size");
    for region in layout.iter() {
        info!("{:<24} {:>12} {:>12}", region.name, region.offset, region.size);
    }
}

fn execute_commands() -> Result<()> {
    // Initialize logger with clean format (no timestamp/module prefix)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "{}", record.args())
        })
        .init();

    let matches = Command::new("gpt2")
        .about("GPT-2 CLI: inspect checkpoints and plan model sizes")
        .subcommand(inspect_subcommand())
        .subcommand(params_subcommand())
        .get_matches();

    match matches.subcommand() {
        Some(("inspect", matches)) => run_inspect_command(matches),
        Some(("params", matches)) => run_params_command(matches),
        _ => anyhow::bail!("No subcommand specified. Use -h to print help information."),
    }
}

fn main() {
    if let Err(e) = execute_commands() {
        error!("Error: {e}");
        std::process::exit(1);
    }
}
