use envdeck_core::normalize::{self, Provider};

pub fn run(provider: &str, code: i64) -> Result<(), Box<dyn std::error::Error>> {
    let provider: Provider = provider.parse()?;
    match normalize::classify(provider, code) {
        Some(condition) => println!("{condition}"),
        None => println!("unknown"),
    }
    Ok(())
}
