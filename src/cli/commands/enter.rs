//! Enter command - run a command (or a shell) inside the chroot

use crate::chroot::enter::{ChrootEnterer, EnterOpts};
use crate::cli::args::EnterArgs;
use crate::cli::commands::CommandContext;
use crate::config::Config;
use crate::error::BurrowResult;

/// Execute the enter command
///
/// The process exits with the inner command's code, so scripts can wrap
/// `burrow enter -- ...` transparently.
pub async fn execute(args: EnterArgs, config: &Config) -> BurrowResult<()> {
    let ctx = CommandContext::resolve(config)?;
    let enterer = ChrootEnterer::new(ctx.chroot, ctx.user.name);

    let opts = EnterOpts {
        read_only: args.read_only,
        cwd: args.cwd,
        env: args.env.into_iter().collect(),
    };

    let code = enterer.enter(&args.command, &opts).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
