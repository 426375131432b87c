//! Stamps the binary with build timestamp and git commit for `--version`.

use vergen::{BuildBuilder, Emitter};
use vergen_gitcl::GitclBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = BuildBuilder::all_build()?;
    let git = GitclBuilder::all_git()?;
    Emitter::default().add_instructions(&build)?.add_instructions(&git)?.emit()?;
    Ok(())
}
