mod bot;
mod cli;
mod command;
mod config;
mod dispatch;
mod error;
mod executor;
mod report;
mod schema;
mod server;
mod sheets;
#[cfg(test)]
mod testing;
mod types;
mod util;
mod webex;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::command::tokenize;
use crate::config::{BotSettings, FileConfig};
use crate::error::BotResult;
use crate::executor::execute;
use crate::server::run_server;
use crate::sheets::SheetsClient;
use crate::webex::WebexClient;

const DEFAULT_LOG_FILTER: &str = "sheetdesk=info";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn store_client(settings: &BotSettings) -> SheetsClient {
    SheetsClient::new(
        settings.sheet_file_id.clone(),
        settings.credentials.clone(),
        settings.http_timeout,
    )
}

fn serve(settings: BotSettings) -> BotResult<()> {
    tracing::debug!(?settings, "resolved settings");
    let transport = WebexClient::new(settings.require_webex_token()?, settings.http_timeout)?;
    let bot_id = match &settings.bot_id {
        Some(id) => id.clone(),
        None => {
            let id = transport.whoami()?;
            tracing::info!(bot_id = %id, "resolved bot identity");
            id
        }
    };
    let store = store_client(&settings);
    let profile = settings.profile(bot_id);
    run_server(&settings.bind, settings.port, &transport, &store, &profile)
}

fn exec(settings: BotSettings, words: &[String]) -> BotResult<()> {
    let store = store_client(&settings);
    let invocation = tokenize(&words.join(" "));
    let reply = execute(&store, &invocation, &settings.exec_settings())?;
    println!("{}", reply.text());
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            common,
            bind,
            port,
            inline_limit,
            chunk_limit,
            attachment_format,
        } => {
            let overrides = common.overrides().overlay(FileConfig {
                bind,
                port,
                inline_limit,
                chunk_limit,
                attachment_format,
                ..FileConfig::default()
            });
            let settings = BotSettings::load(common.config.as_deref(), overrides)?;
            serve(settings)?;
            Ok(())
        }

        Command::Exec { common, text } => {
            let settings = BotSettings::load(common.config.as_deref(), common.overrides())?;
            exec(settings, &text)?;
            Ok(())
        }
    }
}
