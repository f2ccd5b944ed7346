//! This crate contains acceptance tests running the checks of the *resource_checker*
//! on the C fixture programs in the `fixtures` directory.
//!
//! The checks are run in-process through the library crate,
//! with the same pipeline and the same default configuration
//! that the command line program uses.

use colored::*;
use resource_checker_lib::analysis::function_pointers::compute_function_pointers;
use resource_checker_lib::analysis::graph;
use resource_checker_lib::frontend::parse_project;
use resource_checker_lib::get_modules;
use resource_checker_lib::utils::log::CweWarning;
use resource_checker_lib::utils::read_config_file;
use resource_checker_lib::AnalysisResults;

/// The C fixture files checked by the acceptance tests.
pub const FIXTURES: &[&str] = &[
    "table-allocator.c",
    "copy-prefix.c",
    "status-codes.c",
    "archive-reader.c",
    "unchecked-read.c",
    "double-release.c",
    "missing-release.c",
    "conditional-release.c",
    "null-handler-dispatch.c",
];

/// A test case containing the necessary information to run an acceptance test.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct FixtureTestCase {
    /// The file name of the C fixture to analyze
    fixture: &'static str,
    /// The name of the *resource_checker*-check to execute
    check_name: &'static str,
}

impl FixtureTestCase {
    /// Get the file path of the fixture source file
    fn get_filepath(&self) -> String {
        format!("fixtures/{}", self.fixture)
    }

    /// Run the test case and print to the shell, whether the test case succeeded or not.
    /// Returns an error message on failure.
    pub fn run_test(
        &self,
        search_string: &str,
        num_expected_occurences: usize,
    ) -> Result<(), String> {
        let filepath = self.get_filepath();
        match run_check(&filepath, self.check_name) {
            Ok(warnings) => {
                let num_cwes = warnings
                    .iter()
                    .filter(|warning| format!("{warning}").starts_with(search_string))
                    .count();
                if num_cwes == num_expected_occurences {
                    println!("{} \t {}", filepath, "[OK]".green());
                    Ok(())
                } else {
                    println!("{} \t {}", filepath, "[FAILED]".red());
                    Err(format!(
                        "Expected occurrences: {num_expected_occurences}. Found: {num_cwes}"
                    ))
                }
            }
            Err(error) => {
                println!("{} \t {}", filepath, "[FAILED]".red());
                Err(error)
            }
        }
    }
}

/// Run a single check on the given fixture file and return the generated CWE warnings.
///
/// The pipeline mirrors the one of the command line program:
/// parse the source file, normalize the generated program,
/// resolve function pointers, learn the error contracts
/// and then execute the requested check with the default configuration.
pub fn run_check(filepath: &str, check_name: &str) -> Result<Vec<CweWarning>, String> {
    let source = std::fs::read_to_string(filepath)
        .map_err(|err| format!("Could not read {filepath}: {err}"))?;
    let mut project = parse_project(&source, filepath)
        .map_err(|err| format!("Parsing failed for {filepath}: {err}"))?;
    let _logs = project.normalize();
    let config = read_config_file(None).map_err(|err| format!("{err}"))?;

    let (function_pointers, _logs) = compute_function_pointers(&project);
    project.insert_indirect_call_targets(&function_pointers);
    let control_flow_graph = graph::get_program_cfg(&project.program);
    let analysis_results = AnalysisResults::new(&source, &control_flow_graph, &project)
        .with_function_pointers(Some(&function_pointers));
    let (error_contracts, _logs) =
        analysis_results.compute_error_contracts(&config["error_contracts"]);
    let analysis_results = analysis_results.with_error_contracts(Some(&error_contracts));

    let module = get_modules()
        .into_iter()
        .find(|module| module.name == check_name)
        .ok_or_else(|| format!("{check_name} is not a valid check name"))?;
    let (_logs, warnings) = (module.run)(&analysis_results, &config[&module.name]);
    Ok(warnings)
}

/// Generate test cases for all given fixture files, all running the same check.
pub fn fixture_test_cases(
    fixtures: &[&'static str],
    check_name: &'static str,
) -> Vec<FixtureTestCase> {
    fixtures
        .iter()
        .map(|&fixture| FixtureTestCase {
            fixture,
            check_name,
        })
        .collect()
}

/// Print the error messages of failed checks.
/// The `error_log` tuples are of the form `(check_filename, error_message)`.
pub fn print_errors(error_log: Vec<(String, String)>) {
    for (filepath, error) in error_log {
        println!("{}", format!("+++ Error for {filepath} +++").red());
        println!("{error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cwe_252() {
        let mut error_log = Vec::new();
        let tests = fixture_test_cases(FIXTURES, "CWE252");

        for test_case in tests {
            let num_expected_occurences = match test_case.fixture {
                // Both the discarded and the never checked read result are reported.
                "unchecked-read.c" => 2,
                // `drive` ignores the result of `pull_header`,
                // whose error return value is only known through generalization.
                "status-codes.c" => 1,
                _ => 0,
            };
            if let Err(error) = test_case.run_test("[CWE252]", num_expected_occurences) {
                error_log.push((test_case.get_filepath(), error));
            }
        }
        if !error_log.is_empty() {
            print_errors(error_log);
            panic!();
        }
    }

    #[test]
    fn cwe_415() {
        let mut error_log = Vec::new();
        // The double free detection is part of the CWE772 check.
        let tests = fixture_test_cases(FIXTURES, "CWE772");

        for test_case in tests {
            let num_expected_occurences = match test_case.fixture {
                "double-release.c" => 1,
                _ => 0,
            };
            if let Err(error) = test_case.run_test("[CWE415]", num_expected_occurences) {
                error_log.push((test_case.get_filepath(), error));
            }
        }
        if !error_log.is_empty() {
            print_errors(error_log);
            panic!();
        }
    }

    #[test]
    fn cwe_476() {
        let mut error_log = Vec::new();
        let tests = fixture_test_cases(FIXTURES, "CWE476");

        for test_case in tests {
            let num_expected_occurences = match test_case.fixture {
                "null-handler-dispatch.c" => 1,
                _ => 0,
            };
            if let Err(error) = test_case.run_test("[CWE476]", num_expected_occurences) {
                error_log.push((test_case.get_filepath(), error));
            }
        }
        if !error_log.is_empty() {
            print_errors(error_log);
            panic!();
        }
    }

    #[test]
    fn cwe_772() {
        let mut error_log = Vec::new();
        let tests = fixture_test_cases(FIXTURES, "CWE772");

        for test_case in tests {
            let num_expected_occurences = match test_case.fixture {
                "missing-release.c" => 1,
                // The leak on the early-exit path is reported with lower confidence.
                "conditional-release.c" => 1,
                _ => 0,
            };
            if let Err(error) = test_case.run_test("[CWE772]", num_expected_occurences) {
                error_log.push((test_case.get_filepath(), error));
            }
        }
        if !error_log.is_empty() {
            print_errors(error_log);
            panic!();
        }
    }

    #[test]
    fn json_output_contains_the_check_name() {
        let warnings = run_check("fixtures/double-release.c", "CWE772").unwrap();
        let json = serde_json::to_value(&warnings).unwrap();
        assert_eq!(json[0]["name"], "CWE415");
        assert_eq!(json[0]["addresses"].as_array().unwrap().len(), 2);
    }
}
