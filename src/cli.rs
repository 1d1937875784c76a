use crate::{command, config};
use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "turbo")]
#[command(about = "Run a coding agent inside an isolated Docker sandbox for the current project")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the sandbox image from the project's Dockerfile
    Build {
        /// Also install the agent plugins into the sandbox afterwards
        #[arg(long)]
        with_plugins: bool,
    },

    /// Start an interactive agent session in the sandbox
    Claude,

    /// Send a single prompt to the agent and print its answer
    Prompt {
        /// Prompt text
        prompt: String,
    },

    /// Run a command inside the sandbox
    Exec {
        /// Command and its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Remove the sandbox for this project
    #[command(visible_alias = "remove")]
    Rm {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Let the sandbox reach the project's hosts through the proxy
    Prepare,

    /// Show the sandbox, its image and whether it exists
    Status,

    /// Build, provision, install plugins and prepare networking in one go
    Setup {
        /// Remove an existing sandbox and create it again
        #[arg(long)]
        rebuild: bool,
    },

    /// List and publish agent skills
    Skills {
        #[command(subcommand)]
        command: SkillsCommands,
    },

    /// Detect test/lint scripts to use as feedback loops
    FeedbackLoops,

    /// Generate example .turbo.yaml configuration file
    Init,

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum SkillsCommands {
    /// List skills available for publishing
    #[command(visible_alias = "ls")]
    List,

    /// Copy skills into the project, injecting feedback loops
    Publish {
        /// Publish every available skill
        #[arg(long, conflicts_with = "skills")]
        all: bool,

        /// Overwrite skills already present without asking
        #[arg(short, long)]
        force: bool,

        /// Skill names to publish
        #[arg(long, num_args = 1..)]
        skills: Vec<String>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { with_plugins } => command::build::run(with_plugins),
        Commands::Claude => command::claude::run(),
        Commands::Prompt { prompt } => command::prompt::run(&prompt),
        Commands::Exec { command } => command::exec::run(&command),
        Commands::Rm { yes } => command::remove::run(yes),
        Commands::Prepare => command::prepare::run(),
        Commands::Status => command::status::run(),
        Commands::Setup { rebuild } => command::setup::run(rebuild),
        Commands::Skills { command } => match command {
            SkillsCommands::List => command::skills::list(),
            SkillsCommands::Publish { all, force, skills } => {
                command::skills::publish(all, force, &skills)
            }
        },
        Commands::FeedbackLoops => command::feedback_loops::run(),
        Commands::Init => config::Config::init(),
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
    }
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, &name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exec_keeps_hyphenated_arguments() {
        let cli = Cli::try_parse_from(["turbo", "exec", "ls", "-la", "/workspace"]).unwrap();
        match cli.command {
            Commands::Exec { command } => assert_eq!(command, vec!["ls", "-la", "/workspace"]),
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn test_exec_requires_a_command() {
        assert!(Cli::try_parse_from(["turbo", "exec"]).is_err());
    }

    #[test]
    fn test_publish_all_conflicts_with_named_skills() {
        let result =
            Cli::try_parse_from(["turbo", "skills", "publish", "--all", "--skills", "tdd"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_publish_accepts_several_skills() {
        let cli =
            Cli::try_parse_from(["turbo", "skills", "publish", "--skills", "tdd", "debugging"])
                .unwrap();
        match cli.command {
            Commands::Skills {
                command: SkillsCommands::Publish { all, force, skills },
            } => {
                assert!(!all);
                assert!(!force);
                assert_eq!(skills, vec!["tdd", "debugging"]);
            }
            _ => panic!("expected skills publish"),
        }
    }

    #[test]
    fn test_rm_accepts_yes_flag() {
        let cli = Cli::try_parse_from(["turbo", "rm", "-y"]).unwrap();
        assert!(matches!(cli.command, Commands::Rm { yes: true }));
    }
}
