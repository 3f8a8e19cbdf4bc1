use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand};
use domain::scenario::ScenarioRegistry;

#[derive(Parser, Debug)]
#[command(name = "tl")]
#[command(about = "Treeline personal finance CLI", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Toggle demo mode on/off.
    Demo(DemoArgs),
}

#[derive(Args, Debug)]
#[command(
    long_about = "Toggle demo mode on/off.\n\n\
                  Demo mode uses a separate database, allowing you to explore Treeline \
                  without affecting your real data.\n\n\
                  Examples:\n  \
                  tl demo                       # Show current status\n  \
                  tl demo on                    # Enable with sample data\n  \
                  tl demo on --scenario empty   # Enable with empty database\n  \
                  tl demo on -s empty           # Short form\n  \
                  tl demo off                   # Disable demo mode",
    after_help = ScenarioRegistry::builtin().help_text()
)]
pub struct DemoArgs {
    /// Action: 'on', 'off', or 'status' (default: status)
    pub action: Option<String>,

    /// Demo scenario to use
    #[arg(
        short,
        long,
        default_value = "default",
        ignore_case = true,
        value_parser = PossibleValuesParser::new(ScenarioRegistry::builtin().names().to_vec())
    )]
    pub scenario: String,
}

impl DemoArgs {
    pub fn action(&self) -> &str {
        self.action.as_deref().unwrap_or("status")
    }

    /// Scenario name normalized to the registry's lower-case keys.
    pub fn scenario(&self) -> String {
        self.scenario.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<DemoArgs, clap::Error> {
        let cli = Cli::try_parse_from(std::iter::once("tl").chain(args.iter().copied()))?;
        match cli.command {
            Command::Demo(args) => Ok(args),
        }
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_to_status_and_default_scenario() {
        let args = parse(&["demo"]).unwrap();
        assert_eq!(args.action(), "status");
        assert_eq!(args.scenario(), "default");
    }

    #[test]
    fn scenario_is_case_insensitive() {
        let args = parse(&["demo", "on", "--scenario", "EMPTY"]).unwrap();
        assert_eq!(args.action(), "on");
        assert_eq!(args.scenario(), "empty");

        let args = parse(&["demo", "on", "-s", "Default"]).unwrap();
        assert_eq!(args.scenario(), "default");
    }

    #[test]
    fn unknown_scenario_is_rejected_by_parser() {
        let err = parse(&["demo", "on", "-s", "heavy"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn action_is_passed_through_verbatim() {
        let args = parse(&["demo", "RESET"]).unwrap();
        assert_eq!(args.action(), "RESET");
    }
}
