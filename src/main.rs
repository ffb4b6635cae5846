// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;

use ledgerline::{cli, commands, config::Config};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli::build_cli().get_matches();

    let mut config = Config::from_env();
    if let Some(path) = matches.get_one::<String>("db") {
        config.db_path = Some(path.clone());
    }
    let ctx = commands::AppContext::open(config)?;

    match matches.subcommand() {
        Some(("init", _)) => {
            let path = ledgerline::db::db_path(ctx.config.db_path.as_deref())?;
            println!("Database initialized at {}", path.display());
            println!("Device id {}", ctx.store.device_id());
        }
        Some(("login", sub)) => commands::accounts::login(&ctx, sub)?,
        Some(("logout", _)) => commands::accounts::logout(&ctx)?,
        Some(("wipe", sub)) => commands::accounts::wipe(&ctx, sub)?,
        Some(("entry", sub)) => commands::entries::handle(&ctx.store, sub)?,
        Some(("category", sub)) => commands::categories::handle(sub)?,
        Some(("sync", sub)) => commands::sync::handle(&ctx, sub).await?,
        Some(("report", sub)) => commands::reports::handle(&ctx, sub).await?,
        Some(("export", sub)) => commands::exporter::handle(&ctx.store, sub)?,
        Some(("doctor", _)) => commands::doctor::handle(&ctx)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
