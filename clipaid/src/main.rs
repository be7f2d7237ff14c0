fn main() {
    clipaid_lib::run()
}
