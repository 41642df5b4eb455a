//! Shell completion generation for dbdump
//!
//! This module generates completion scripts for bash, zsh and fish, with
//! dynamic completion of datasource names read from the config file.

use clap::CommandFactory;
use clap_complete::{Shell, generate};

use crate::cli::CliArgs;
use crate::error::{ConfigError, Result};

/// Generate shell completion script
///
/// # Arguments
/// * `shell_name` - Shell type (bash, zsh, fish)
///
/// # Returns
/// * `Result<()>` - Success or error
pub fn generate_completion(shell_name: &str) -> Result<()> {
    let script = completion_script(parse_shell(shell_name)?);
    print!("{}", script);
    Ok(())
}

/// Parse shell name string to Shell enum
fn parse_shell(shell_name: &str) -> Result<Shell> {
    match shell_name.to_lowercase().as_str() {
        "bash" => Ok(Shell::Bash),
        "zsh" => Ok(Shell::Zsh),
        "fish" => Ok(Shell::Fish),
        _ => Err(ConfigError::InvalidValue {
            field: "shell".to_string(),
            value: format!("{} (supported: bash, zsh, fish)", shell_name),
        }
        .into()),
    }
}

/// Build the clap-generated script plus datasource completion for a shell
fn completion_script(shell: Shell) -> String {
    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, "dbdump", &mut buffer);
    let base = String::from_utf8_lossy(&buffer);

    let extra = match shell {
        Shell::Bash => BASH_DATASOURCES,
        Shell::Zsh => ZSH_DATASOURCES,
        Shell::Fish => FISH_DATASOURCES,
        _ => "",
    };
    format!("{}\n{}", base, extra)
}

const BASH_DATASOURCES: &str = r#"
# Datasource names come from the config file
_dbdump_enhanced() {
    local cur prev words cword
    _init_completion || return

    if [[ "$prev" == "-d" || "$prev" == "--datasource" ]]; then
        COMPREPLY=($(compgen -W "$(dbdump config --list-datasources 2>/dev/null)" -- "$cur"))
        return 0
    fi

    _dbdump "$@"
}

complete -F _dbdump_enhanced dbdump
"#;

const ZSH_DATASOURCES: &str = r#"
# Datasource names come from the config file
_dbdump_datasources() {
    local -a datasources
    datasources=($(dbdump config --list-datasources 2>/dev/null))
    _describe 'datasources' datasources
}

_dbdump_enhanced() {
    if [[ ${words[CURRENT-1]} == "-d" || ${words[CURRENT-1]} == "--datasource" ]]; then
        _dbdump_datasources
        return 0
    fi
    _dbdump "$@"
}

compdef _dbdump_enhanced dbdump
"#;

const FISH_DATASOURCES: &str = r#"
# Datasource names come from the config file
complete -c dbdump -n "__fish_seen_subcommand_from dump" -s d -l datasource -f -a "(dbdump config --list-datasources 2>/dev/null)" -d "Datasource name from config file"
"#;
