fn main() {
    snipforge_cli::run_main();
}
