//! This crate defines the command line interface for the resource_checker.
//! General documentation about the resource_checker is contained in the [`resource_checker_lib`] crate.

extern crate resource_checker_lib; // Needed for the docstring-link to work

use anyhow::{Context, Error};
use resource_checker_lib::analysis::function_pointers::compute_function_pointers;
use resource_checker_lib::analysis::graph;
use resource_checker_lib::frontend::parse_project;
use resource_checker_lib::utils::log::{print_all_messages, LogLevel};
use resource_checker_lib::utils::read_config_file;
use resource_checker_lib::AnalysisResults;
use std::collections::HashSet;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
/// Find resource handling bugs in C source code
struct CmdlineArgs {
    /// The path to the C source file.
    #[structopt(required_unless("module-versions"), validator(check_file_existence))]
    source: Option<String>,

    /// Path to a custom configuration file to use instead of the standard one.
    #[structopt(long, short, validator(check_file_existence))]
    config: Option<String>,

    /// Write the results to a file instead of stdout.
    /// This only affects CWE warnings. Log messages are still printed to stdout.
    #[structopt(long, short)]
    out: Option<String>,

    /// Specify a specific set of checks to be run as a comma separated list, e.g. 'CWE252,CWE772'.
    ///
    /// Use the "--module-versions" command line option to get a list of all valid check names.
    #[structopt(long, short)]
    partial: Option<String>,

    /// Generate JSON output.
    #[structopt(long, short)]
    json: bool,

    /// Do not print log messages. This prevents polluting stdout for json output.
    #[structopt(long, short)]
    quiet: bool,

    /// Prints out the version numbers of all known modules.
    #[structopt(long)]
    module_versions: bool,

    /// Also print the debug level log messages of the analyses,
    /// e.g. the generalization steps of the error contract computation.
    #[structopt(long, short)]
    verbose: bool,
}

fn main() -> Result<(), Error> {
    let cmdline_args = CmdlineArgs::from_args();

    run_checks(cmdline_args)
}

/// Check the existence of a file
fn check_file_existence(file_path: String) -> Result<(), String> {
    if std::fs::metadata(&file_path)
        .map_err(|err| format!("{}", err))?
        .is_file()
    {
        Ok(())
    } else {
        Err(format!("{} is not a file.", file_path))
    }
}

/// Parse the given source file and run the checks on it.
fn run_checks(args: CmdlineArgs) -> Result<(), Error> {
    let mut modules = resource_checker_lib::get_modules();
    if args.module_versions {
        // Only print the module versions and then quit.
        println!("[resource_checker] module_versions:");
        for module in modules.iter() {
            println!("{}", module);
        }
        return Ok(());
    }

    // Get the configuration file
    let config: serde_json::Value = read_config_file(args.config.as_deref())
        .context("Parsing of the configuration file failed")?;

    // Filter the modules to be executed if the `--partial` parameter is set.
    if let Some(ref partial_module_list) = args.partial {
        filter_modules_for_partial_run(&mut modules, partial_module_list);
    }

    let source_file_path = args.source.unwrap();
    let source = std::fs::read_to_string(&source_file_path)
        .with_context(|| format!("Could not read from file path {}", source_file_path))?;
    let mut project = parse_project(&source, &source_file_path)
        .with_context(|| format!("Error while parsing {}", source_file_path))?;
    // Normalize the project and gather log messages generated from it.
    let mut all_logs = project.normalize();

    // Resolve function pointers stored in struct fields
    // so that calls through them take part in the interprocedural analyses.
    let (function_pointers, mut pointer_logs) = compute_function_pointers(&project);
    all_logs.append(&mut pointer_logs);
    project.insert_indirect_call_targets(&function_pointers);

    // Generate the control flow graph of the program
    let control_flow_graph = graph::get_program_cfg(&project.program);

    let analysis_results = AnalysisResults::new(&source, &control_flow_graph, &project)
        .with_function_pointers(Some(&function_pointers));

    let modules_depending_on_error_contracts = vec!["CWE252", "CWE772"];
    let error_contracts_results = if modules
        .iter()
        .any(|module| modules_depending_on_error_contracts.contains(&module.name))
    {
        let (contracts, mut contract_logs) =
            analysis_results.compute_error_contracts(&config["error_contracts"]);
        all_logs.append(&mut contract_logs);
        Some(contracts)
    } else {
        None
    };
    let analysis_results = analysis_results.with_error_contracts(error_contracts_results.as_ref());

    // Execute the modules and collect their logs and CWE-warnings.
    let mut all_cwes = Vec::new();
    for module in modules {
        let (mut logs, mut cwes) = (module.run)(&analysis_results, &config[&module.name]);
        all_logs.append(&mut logs);
        all_cwes.append(&mut cwes);
    }

    // Print the results of the modules.
    if args.quiet {
        all_logs = Vec::new(); // Suppress all log messages since the `--quiet` flag is set.
    } else if !args.verbose {
        all_logs.retain(|log| log.level != LogLevel::Debug);
    }
    print_all_messages(all_logs, all_cwes, args.out.as_deref(), args.json);
    Ok(())
}

/// Only keep the modules specified by the `--partial` parameter in the `modules` list.
/// The parameter is a comma-separated list of module names, e.g. 'CWE252,CWE772'.
fn filter_modules_for_partial_run(
    modules: &mut Vec<&resource_checker_lib::CweModule>,
    partial_param: &str,
) {
    let module_names: HashSet<&str> = partial_param.split(',').collect();
    *modules = module_names
        .into_iter()
        .filter_map(|module_name| {
            if let Some(module) = modules.iter().find(|module| module.name == module_name) {
                Some(*module)
            } else if module_name.is_empty() {
                None
            } else {
                panic!("Error: {} is not a valid module name.", module_name)
            }
        })
        .collect();
}
