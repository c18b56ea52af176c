fn main() {
    simdata_pipeline::cli::run();
}
