use park_sim::config::{self, Command, FormatArg};
use park_sim::engine;
use park_sim::error::Result;
use park_sim::logging;
use park_sim::models::PolicyKind;
use park_sim::output::{self, Formatter, HumanFormatter, JsonFormatter, SummaryFormatter};

fn main() {
    logging::init_logging();
    if let Err(err) = run() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = config::parse_args()?;

    match cli.command {
        Command::Run(args) => {
            let config = config::build_config(&args.sim)?;
            let store_log = args.format != FormatArg::Summary || args.export.is_some();
            let result = engine::run_simulation_with_options(&config, store_log)?;
            if let Some(path) = &args.export {
                output::export_log(path, &result.log)?;
            }
            print!("{}", formatter_for(&args.format).write(&result));
        }
        Command::Compare(args) => {
            let config = config::build_config(&args.sim)?;
            let results = engine::compare_policies(&config)?;
            print!("{}", formatter_for(&args.format).write_comparison(&results));
        }
        Command::ShowConfig(args) => {
            let config = config::build_config(&args)?;
            print!("{}", output::format_config(&config));
        }
        Command::ListPolicies => {
            for policy in PolicyKind::ALL {
                println!("{}", policy);
            }
        }
        Command::ExportLayout(args) => {
            let source = config::layout_source(&args)?;
            let description = engine::load_facility(&source)?.to_description();
            match &args.output {
                Some(path) => description.save(path)?,
                None => println!("{}", description.to_json_string()?),
            }
        }
    }

    Ok(())
}

fn formatter_for(format: &FormatArg) -> Box<dyn Formatter> {
    match format {
        FormatArg::Human => Box::new(HumanFormatter),
        FormatArg::Summary => Box::new(SummaryFormatter),
        FormatArg::Json => Box::new(JsonFormatter),
    }
}
