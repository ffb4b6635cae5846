// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{anyhow, Context, Result};

use super::AppContext;
use crate::session::is_valid_user_id;

pub fn login(ctx: &AppContext, m: &clap::ArgMatches) -> Result<()> {
    let user = m.get_one::<String>("user").context("--user is required")?;
    if !is_valid_user_id(user) {
        // Local-only ids are accepted; they just never sync.
        log::warn!("user id '{}' is not a UUID; remote sync stays disabled", user);
    }
    ctx.sessions.login(user)?;
    println!("Signed in as {}", user.trim());
    Ok(())
}

pub fn logout(ctx: &AppContext) -> Result<()> {
    ctx.sessions.logout()?;
    println!("Signed out");
    Ok(())
}

/// Irreversible; only meant for account deletion.
pub fn wipe(ctx: &AppContext, m: &clap::ArgMatches) -> Result<()> {
    if !m.get_flag("yes") {
        return Err(anyhow!("Refusing to wipe local data without --yes"));
    }
    let pending = ctx.store.pending_count()?;
    if pending > 0 {
        log::warn!("wiping {} entr(ies) that never reached the remote", pending);
    }
    ctx.store.wipe_all()?;
    println!("Local data wiped");
    Ok(())
}
