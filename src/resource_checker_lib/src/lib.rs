/*!
The main library of the resource_checker containing all checks and analysis modules.

# What is the resource_checker

The resource_checker is a tool for finding resource handling bugs in C source code
using static analysis.
The bug classes it looks for are formally known as
[Common Weakness Enumerations](https://cwe.mitre.org/) (CWEs):
unchecked return values of fallible calls,
dispatch through possibly-NULL function pointers,
double releases and missing releases of acquired resources.
Its main goal is to aid code reviewers to quickly find suspicious code paths.

The resource_checker parses a single C source file with its own frontend
into one common intermediate representation
and implements its analyses on this IR.
Headers are not resolved. Functions whose definitions live in skipped headers
surface as extern symbols,
and everything the analyses assume about them comes from the configuration file.

# Usage

```sh
resource_checker SOURCE_FILE.c
```

One can modify the behaviour of the resource_checker through the command line.
Use the `--help` command line option for more information.
One can also provide a custom configuration file to modify the behaviour of each check
through the `--config` command line option.
Start by taking a look at the standard configuration file located at `src/resource_checker_lib/config.json`
and read the [check-specific documentation](crate::checkers) for more details
about each field in the configuration file.

# Integration into other tools

Integration of the resource_checker into other tools is possible
via the JSON output produced with the `--json` command line flag.

# Further documentation

You can find out more about the internal structure of the resource_checker
by reading the module documentation:
the [`frontend`] module for parsing and lowering,
the [`analysis`] module for the pointer model, the contract learner
and the fixpoint machinery,
and the [`checkers`] module for the individual checks.
*/

pub mod abstract_domain;
pub mod analysis;
pub mod checkers;
pub mod frontend;
pub mod intermediate_representation;
pub mod utils;

use analysis::error_contracts::ErrorContracts;
use analysis::function_pointers::FunctionPointers;
use analysis::graph::Graph;
use intermediate_representation::Project;
use utils::log::{CweWarning, LogMessage};

mod prelude {
    pub use serde::{Deserialize, Serialize};

    pub use crate::intermediate_representation::{ByteSize, Term, Tid};
    pub use crate::AnalysisResults;
    pub use anyhow::{anyhow, Error};
}

/// The generic function signature for the main function of a CWE module
pub type CweModuleFn =
    fn(&AnalysisResults, &serde_json::Value) -> (Vec<LogMessage>, Vec<CweWarning>);

/// A structure containing general information about a CWE analysis module,
/// including the function to be called to run the analysis.
pub struct CweModule {
    /// The name of the CWE check.
    pub name: &'static str,
    /// The version number of the CWE check.
    /// Should be incremented whenever significant changes are made to the check.
    pub version: &'static str,
    /// The function that executes the check and returns CWE warnings found during the check.
    pub run: CweModuleFn,
}

impl std::fmt::Display for CweModule {
    /// Print the module name and its version number.
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, r#""{}": "{}""#, self.name, self.version)
    }
}

/// Get a list of all known analysis modules.
pub fn get_modules() -> Vec<&'static CweModule> {
    vec![
        &crate::checkers::cwe_252::CWE_MODULE,
        &crate::checkers::cwe_476::CWE_MODULE,
        &crate::checkers::cwe_772::CWE_MODULE,
    ]
}

/// A struct containing pointers to all known analysis results
/// that may be needed as input for other analyses and CWE checks.
#[derive(Clone, Copy)]
pub struct AnalysisResults<'a> {
    /// The source text of the analyzed file.
    pub source: &'a str,
    /// The computed control flow graph of the program.
    pub control_flow_graph: &'a Graph<'a>,
    /// A pointer to the project struct
    pub project: &'a Project,
    /// The result of the function pointer analysis if already computed.
    pub function_pointers: Option<&'a FunctionPointers>,
    /// The learned error contracts if already computed.
    pub error_contracts: Option<&'a ErrorContracts>,
}

impl<'a> AnalysisResults<'a> {
    /// Create a new `AnalysisResults` struct with only the project itself known.
    pub fn new(
        source: &'a str,
        control_flow_graph: &'a Graph<'a>,
        project: &'a Project,
    ) -> AnalysisResults<'a> {
        AnalysisResults {
            source,
            control_flow_graph,
            project,
            function_pointers: None,
            error_contracts: None,
        }
    }

    /// Create a new `AnalysisResults` struct containing the given
    /// function pointer analysis results.
    pub fn with_function_pointers(
        self,
        function_pointers: Option<&'a FunctionPointers>,
    ) -> AnalysisResults<'a> {
        AnalysisResults {
            function_pointers,
            ..self
        }
    }

    /// Compute the error contracts of all functions of the project.
    /// The result gets returned, but not saved to the `AnalysisResults` struct itself.
    ///
    /// The function pointer analysis results have to be computed beforehand,
    /// since calls through resolved function pointers take part
    /// in the contract propagation.
    pub fn compute_error_contracts(
        &self,
        config: &serde_json::Value,
    ) -> (ErrorContracts, Vec<LogMessage>) {
        analysis::error_contracts::compute_error_contracts(
            self.project,
            self.control_flow_graph,
            self.function_pointers.unwrap(),
            &serde_json::from_value(config.clone()).unwrap(),
        )
    }

    /// Create a new `AnalysisResults` struct containing the given error contracts.
    pub fn with_error_contracts(
        self,
        error_contracts: Option<&'a ErrorContracts>,
    ) -> AnalysisResults<'a> {
        AnalysisResults {
            error_contracts,
            ..self
        }
    }
}
