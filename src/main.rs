fn main() {
    browser_backend::run()
}
