fn main() {
    if let Err(e) = defacto_driver::main() {
        eprintln!("\u{1b}[1;31merror:\u{1b}[0m {e}");
        std::process::exit(defacto_driver::exit_code(&e));
    }
}
