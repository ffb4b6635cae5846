// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::utils::{pretty_table, CATEGORIES};
use anyhow::Result;

pub fn handle(m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("list", _)) | None => {
            let data = CATEGORIES.iter().map(|c| vec![c.to_string()]).collect();
            println!("{}", pretty_table(&["Category"], data));
        }
        _ => {}
    }
    Ok(())
}
