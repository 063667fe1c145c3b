use dyngufunc::cli;

fn main() -> anyhow::Result<()> {
    if let Err(e) = cli::run() {
        // parse failures have already printed their report
        if e.to_string().contains("signature parsing failed") {
            std::process::exit(1);
        }
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
    Ok(())
}
