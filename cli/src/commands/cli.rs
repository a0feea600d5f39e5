use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "statekeep", version, about = "Inspect and edit component state stores")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of $STATEKEEP_CONFIG / ./statekeep.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides the store's root directory (the `$ROOT$` macro).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct GetArgs {
    pub component: String,

    #[arg(long)]
    pub pretty: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SetArgs {
    pub component: String,

    /// New state as a JSON document.
    pub json: String,

    /// Storage spec of the unit to write, e.g. `$ROOT$/ui.toml`.
    /// Defaults to the store's default unit.
    #[arg(long)]
    pub file: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct WatchArgs {
    /// Poll interval; defaults to `watch.poll_interval_ms` from the config.
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a component's state as JSON.
    Get(GetArgs),
    /// Replace a component's state and save it.
    Set(SetArgs),
    /// List components found in the known units.
    List,
    /// Report units changed by other processes until Ctrl-C.
    Watch(WatchArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_set_with_global_flags() {
        let args = Args::try_parse_from([
            "statekeep",
            "set",
            "Foo",
            "{\"x\":1}",
            "--file",
            "$ROOT$/ui.toml",
            "--root",
            "/tmp/store",
        ])
        .unwrap();

        assert_eq!(args.root, Some(PathBuf::from("/tmp/store")));
        match args.command {
            Commands::Set(set) => {
                assert_eq!(set.component, "Foo");
                assert_eq!(set.file.as_deref(), Some("$ROOT$/ui.toml"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn get_requires_component() {
        assert!(Args::try_parse_from(["statekeep", "get"]).is_err());
    }
}
