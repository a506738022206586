// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// The scopescan ECS measurement scanner
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Args {
    /// Set the configuration file to use
    #[clap(value_name = "FILE", default_value = "./config.yml")]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_defaults_to_the_working_directory() {
        let args = Args::parse_from(["scopescan"]);
        assert_eq!(args.config, PathBuf::from("./config.yml"));
    }

    #[test]
    fn config_path_can_be_overridden() {
        let args = Args::parse_from(["scopescan", "scans/europe.yml"]);
        assert_eq!(args.config, PathBuf::from("scans/europe.yml"));
    }
}
