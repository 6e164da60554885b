//! TFC batch shell
//!
//! Drives a container from the command line: command groups are introduced
//! by `--`-prefixed tokens and executed in order against one container file,
//! e.g. `tfc photos.tfc --init --stash cat.png --tag 1 cute --search cute`.

use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use tfc::{OperationMode, Tfc, TfcError};
use tracing_subscriber::EnvFilter;

const ABOUT: &str = "Tagged File Containers stores files inside a single container file and \
indexes them with arbitrary, user-defined tags. Files can be listed, searched by tag \
intersection, and retrieved by the ID they were assigned when stashed.";

#[derive(Parser, Debug)]
#[command(name = "tfc", version, about = "Tagged File Containers")]
struct Args {
    /// Print background information about the project
    #[arg(long)]
    about: bool,

    /// Path to the container file
    filename: Option<PathBuf>,

    /// Command groups, each introduced by a --command token,
    /// e.g. --init --stash <path> --tag <id> <name>... --search <name>...
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    commands: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.about {
        println!("{ABOUT}");
        return ExitCode::SUCCESS;
    }

    let Some(filename) = args.filename else {
        eprintln!("error: no container file given (try `tfc --help`)");
        return ExitCode::FAILURE;
    };

    let groups = match group_commands(&args.commands) {
        Ok(groups) if groups.is_empty() => {
            eprintln!("error: no commands given (try `tfc --help`)");
            return ExitCode::FAILURE;
        }
        Ok(groups) => groups,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let container = Tfc::open(&filename);
    for (command, command_args) in groups {
        if let Err(err) = run_command(&container, &command, &command_args) {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}

/// Split the raw token stream into (command, args) groups on `--` prefixes.
fn group_commands(tokens: &[String]) -> Result<Vec<(String, Vec<String>)>, String> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for token in tokens {
        if let Some(name) = token.strip_prefix("--") {
            groups.push((name.to_string(), Vec::new()));
        } else {
            match groups.last_mut() {
                Some((_, args)) => args.push(token.clone()),
                None => return Err(format!("unexpected argument {token:?} before any command")),
            }
        }
    }
    Ok(groups)
}

fn run_command(container: &Tfc, command: &str, args: &[String]) -> Result<(), Box<dyn Error>> {
    match command {
        "init" => {
            container.set_mode(OperationMode::Create)?;
            container.init()?;
            container.set_mode(OperationMode::Closed)?;
            println!("Initialized container");
        }
        "files" => {
            container.set_mode(OperationMode::Read)?;
            print_files(&container.list_blobs()?);
        }
        "tags" => {
            container.set_mode(OperationMode::Read)?;
            let tags = container.list_tags()?;
            println!("{:<24} {:>8}", "NAME", "FILES");
            for tag in tags {
                println!("{:<24} {:>8}", tag.name, tag.file_count);
            }
        }
        "stash" => {
            let [path] = args else {
                return Err("usage: --stash <path>".into());
            };
            let path = PathBuf::from(path);
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or("path has no file name")?;
            let bytes = std::fs::read(&path)?;

            container.set_mode(OperationMode::Read)?;
            container.set_mode(OperationMode::Edit)?;
            let nonce = container.add_blob(&name, &bytes)?;
            println!("Stashed {name} with ID {nonce}");
        }
        "unstash" => {
            let (id, out) = match args {
                [id] => (id, None),
                [id, out] => (id, Some(PathBuf::from(out))),
                _ => return Err("usage: --unstash <id> [outpath]".into()),
            };
            let nonce = parse_nonce(id)?;

            container.set_mode(OperationMode::Read)?;
            let blob = container.read_blob(nonce)?;
            let out = out.unwrap_or_else(|| PathBuf::from(&blob.info.name));
            std::fs::write(&out, &blob.data)?;
            println!("Unstashed {} into {}", nonce, out.display());
        }
        "delete" => {
            let [id] = args else {
                return Err("usage: --delete <id>".into());
            };
            let nonce = parse_nonce(id)?;

            container.set_mode(OperationMode::Read)?;
            container.set_mode(OperationMode::Edit)?;
            container.delete_blob(nonce)?;
            println!("Deleted {nonce}");
        }
        "tag" => {
            let [id, names @ ..] = args else {
                return Err("usage: --tag <id> <name>...".into());
            };
            if names.is_empty() {
                return Err("usage: --tag <id> <name>...".into());
            }
            let nonce = parse_nonce(id)?;

            container.set_mode(OperationMode::Read)?;
            container.set_mode(OperationMode::Edit)?;
            for name in names {
                container.attach_tag(nonce, name)?;
                println!("Tagged {nonce} as {name}");
            }
        }
        "search" => {
            if args.is_empty() {
                return Err("usage: --search <name>...".into());
            }
            container.set_mode(OperationMode::Read)?;
            print_files(&container.intersection(args)?);
        }
        other => {
            return Err(format!("unknown command --{other} (try `tfc --help`)").into());
        }
    }
    Ok(())
}

fn print_files(files: &[tfc::FileInfo]) {
    println!("{:>8} {:>12} {:<32} TAGS", "ID", "SIZE", "NAME");
    for file in files {
        println!(
            "{:>8} {:>12} {:<32} {}",
            file.nonce,
            file.size,
            file.name,
            file.tags.join(", ")
        );
    }
}

/// Parse a container ID, rejecting negatives before they wrap into u32 space.
fn parse_nonce(arg: &str) -> Result<u32, TfcError> {
    let id: i64 = arg
        .parse()
        .map_err(|_| TfcError::InvalidArgument(format!("{arg:?} is not a container ID")))?;
    if id < 0 {
        return Err(TfcError::InvalidArgument(
            "container IDs cannot be negative".to_string(),
        ));
    }
    u32::try_from(id)
        .map_err(|_| TfcError::InvalidArgument(format!("container ID {id} is out of range")))
}
