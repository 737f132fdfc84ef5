use std::path::PathBuf;

use anyhow::Context;
use channel_twitch::TwitchTransport;
use chat_channel::tags::Tags;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wishmaster::{
    config::{BotConfig, ConfigManager, EnvConfigManager},
    features,
    logger::init_tracing,
    processor::MessageProcessor,
};

#[derive(Parser, Debug)]
#[command(name = "wishmaster", about = "A Twitch chat bot", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to chat and run the bot (default)
    Run(RunArgs),

    /// Parse a raw tag block and print it as JSON
    Tags(TagsArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Settings are read from here before the environment
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Optional log level override (e.g. error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            env_file: PathBuf::from(".env"),
            log_level: None,
        }
    }
}

#[derive(Args, Debug)]
struct TagsArgs {
    /// e.g. `@badges=moderator/1;color=#FF0000;display-name=Dallas`
    raw: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run(args).await,
        Commands::Tags(args) => {
            let tags = Tags::try_parse(&args.raw)?;
            println!("{}", serde_json::to_string_pretty(&tags)?);
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let env = EnvConfigManager::new(Some(args.env_file));
    let config_mgr = ConfigManager(env.clone());
    let mut config = BotConfig::load(&config_mgr).await?;
    if let Some(level) = args.log_level {
        config.log.log_level = level;
    }

    let _guard = init_tracing(&config.log)?;
    env.log_status();
    info!(?config, "wishmaster starting up");

    let transport = TwitchTransport::new(config.twitch());
    let mut processor = MessageProcessor::new(Box::new(transport), &config.channel, config.gate_settings());
    for feature in features::from_config(&config).context("could not set up features")? {
        processor.register_feature(feature);
    }
    info!(triggers = ?processor.router().triggers(), "features registered");

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl-C"),
            Err(e) => error!("could not listen for Ctrl-C: {e}"),
        }
        ctrl_c.cancel();
    });

    let result = processor.run(shutdown).await;
    if let Err(e) = &result {
        error!("wishmaster stopped: {e:#}");
    } else {
        info!("wishmaster shut down");
    }
    result
}
