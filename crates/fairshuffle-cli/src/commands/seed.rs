pub fn run() {
    println!("{}", fairshuffle_core::generate_seed());
}
