use std::process::ExitCode;

use tinyjvm::error::JvmError;
use tinyjvm::{class, classfile, heap, interpreter};
use tracing::{error, info};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("tinyjvm");
    if args.len() != 2 {
        eprintln!("USAGE: {prog} <class file>");
        return ExitCode::FAILURE;
    }

    let cli = clap::Command::new(prog.to_string())
        .arg(clap::arg!(<FILE> "class file to run"));
    let matches = cli.get_matches_from(args.clone());
    let path = matches.get_one::<String>("FILE").expect("required");

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(
            "tinyjvm=info"
                .parse()
                .expect("static directive always parses"),
        ))
        .init();

    match run(path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "aborting");
            ExitCode::FAILURE
        }
    }
}

fn run(path: &str) -> Result<(), JvmError> {
    let raw = classfile::load(path)?;
    let view = class::ClassView::from_raw(raw)?;

    let main_method = view
        .find_method("main", "([Ljava/lang/String;)V")
        .ok_or(JvmError::MissingMain)?;

    info!(class = %view.name, "running");
    let mut heap = heap::Heap::new();
    let args = vec![0i32; main_method.max_locals as usize];
    let result = interpreter::execute(main_method, &args, &view, &mut heap)?;
    info!(class = %view.name, ?result, "finished");
    Ok(())
}
