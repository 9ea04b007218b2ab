use clap::Parser;
use goaltree_cli::GoalCli;

fn main() -> anyhow::Result<()> {
    let cli = GoalCli::parse();
    goaltree_cli::init_tracing(cli.verbose);
    cli.run()
}
