fn main() {
    if let Err(err) = sph_fluid::start() {
        log::error!("{}", err);
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
