mod application;
mod presentation;

use siltpack_core::Result;

fn main() -> Result<()> {
    env_logger::init();
    application::run()
}
