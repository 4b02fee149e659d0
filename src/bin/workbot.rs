use std::sync::atomic::AtomicBool;
use workbot::bot;

fn run() -> Result<(), String> {
    let bot = bot::bootstrap().map_err(|e| e.to_string())?;
    let stop = AtomicBool::new(false);
    bot.run_until_stop(&stop);
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
