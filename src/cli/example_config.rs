//! `pcapherd example-config` - print an example filter configuration.

use pcapherd_core::filter::example_config;

pub fn run() -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(&example_config())?;
    print!("{}", yaml);
    Ok(())
}
