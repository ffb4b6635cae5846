// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{value_parser, Arg, ArgAction, Command};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print as a JSON array"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .conflicts_with("json")
            .help("Print as JSON lines"),
    )
}

fn entry_fields(cmd: Command, required: bool) -> Command {
    cmd.arg(
        Arg::new("date")
            .long("date")
            .required(required)
            .help("Entry date (YYYY-MM-DD)"),
    )
    .arg(
        Arg::new("amount")
            .long("amount")
            .required(required)
            .allow_hyphen_values(true)
            .help("Non-negative amount, e.g. 250.00"),
    )
    .arg(
        Arg::new("type")
            .long("type")
            .required(required)
            .value_parser(["in", "out"])
            .help("in for money received, out for money spent"),
    )
    .arg(Arg::new("category").long("category"))
    .arg(Arg::new("note").long("note"))
    .arg(Arg::new("currency").long("currency"))
}

pub fn build_cli() -> Command {
    Command::new("ledgerline")
        .about("Offline-first personal finance ledger with remote sync")
        .version(clap::crate_version!())
        .arg(
            Arg::new("db")
                .long("db")
                .global(true)
                .help("Path to the local database file"),
        )
        .subcommand(Command::new("init").about("Create the local database"))
        .subcommand(
            Command::new("login")
                .about("Remember the signed-in user for sync")
                .arg(Arg::new("user").long("user").required(true)),
        )
        .subcommand(Command::new("logout").about("Forget the signed-in user"))
        .subcommand(
            Command::new("wipe")
                .about("Delete every local entry and sync record")
                .arg(
                    Arg::new("yes")
                        .long("yes")
                        .action(ArgAction::SetTrue)
                        .help("Confirm the wipe"),
                ),
        )
        .subcommand(
            Command::new("entry")
                .about("Manage local entries")
                .subcommand(entry_fields(Command::new("add"), true))
                .subcommand(entry_fields(
                    Command::new("edit").arg(
                        Arg::new("id")
                            .required(true)
                            .value_parser(value_parser!(i64)),
                    ),
                    false,
                )
                .arg(
                    Arg::new("clear-note")
                        .long("clear-note")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("note"),
                ))
                .subcommand(
                    Command::new("rm").arg(
                        Arg::new("id")
                            .required(true)
                            .value_parser(value_parser!(i64)),
                    ),
                )
                .subcommand(json_flags(
                    Command::new("list")
                        .arg(Arg::new("from").long("from"))
                        .arg(Arg::new("to").long("to"))
                        .arg(
                            Arg::new("pending")
                                .long("pending")
                                .action(ArgAction::SetTrue)
                                .help("Only entries not yet synced"),
                        )
                        .arg(
                            Arg::new("all")
                                .long("all")
                                .action(ArgAction::SetTrue)
                                .help("Include deleted entries"),
                        )
                        .arg(
                            Arg::new("limit")
                                .long("limit")
                                .value_parser(value_parser!(usize)),
                        ),
                )),
        )
        .subcommand(
            Command::new("category")
                .about("Entry categories")
                .subcommand(Command::new("list")),
        )
        .subcommand(
            Command::new("sync")
                .about("Synchronize with the remote store")
                .subcommand(json_flags(
                    Command::new("run").arg(
                        Arg::new("force")
                            .long("force")
                            .action(ArgAction::SetTrue)
                            .help("Ignore the minimum interval"),
                    ),
                ))
                .subcommand(
                    Command::new("watch").arg(
                        Arg::new("interval")
                            .long("interval")
                            .value_parser(value_parser!(u64))
                            .help("Seconds between cycles"),
                    ),
                )
                .subcommand(json_flags(Command::new("status"))),
        )
        .subcommand(
            Command::new("report").about("Summaries").subcommand(json_flags(
                Command::new("summary")
                    .arg(Arg::new("from").long("from").required(true))
                    .arg(Arg::new("to").long("to").required(true))
                    .arg(
                        Arg::new("offline")
                            .long("offline")
                            .action(ArgAction::SetTrue)
                            .help("Use local data only"),
                    ),
            )),
        )
        .subcommand(
            Command::new("export").subcommand(
                Command::new("entries")
                    .arg(
                        Arg::new("format")
                            .long("format")
                            .required(true)
                            .help("csv or json"),
                    )
                    .arg(Arg::new("out").long("out").required(true))
                    .arg(
                        Arg::new("all")
                            .long("all")
                            .action(ArgAction::SetTrue)
                            .help("Include deleted entries"),
                    ),
            ),
        )
        .subcommand(Command::new("doctor").about("Check local data and remote health"))
}
