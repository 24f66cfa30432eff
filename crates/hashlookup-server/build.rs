use vergen_gitcl::{BuildBuilder, CargoBuilder, Emitter, GitclBuilder, RustcBuilder};

/// Git values used when the source is not a git checkout (release tarballs,
/// container builds). CI may provide them through the environment.
const GIT_FALLBACKS: [(&str, &str); 2] = [("VERGEN_GIT_SHA", "unknown"), ("VERGEN_GIT_DIRTY", "false")];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = BuildBuilder::default().build_timestamp(true).build()?;
    let cargo = CargoBuilder::default().target_triple(true).build()?;
    let rustc = RustcBuilder::default().semver(true).build()?;

    let mut emitter = Emitter::default();
    emitter
        .add_instructions(&build)?
        .add_instructions(&cargo)?
        .add_instructions(&rustc)?;

    match GitclBuilder::default().sha(true).dirty(true).build() {
        Ok(git) => {
            emitter.add_instructions(&git)?;
        }
        Err(_) => {
            for (key, default) in GIT_FALLBACKS {
                let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
                println!("cargo::rustc-env={key}={value}");
            }
        }
    }

    emitter.emit()?;
    Ok(())
}
