fn main() {
    #[cfg(feature = "cli")]
    artpack::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("artpack: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
