use anyhow::Result;

pub fn run() -> Result<()> {
    println!("loadtest-operator {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
