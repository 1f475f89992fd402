use std::process::exit;

fn main() {
    env_logger::init();
    match engine::uci::run() {
        Ok(()) => exit(0),
        Err(err) => {
            log::error!("uci loop failed: {err}");
            exit(1);
        }
    }
}
