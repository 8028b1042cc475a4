use crate::error::{ConfigError, ConfigResult};
use crate::source::SourceConfig;

/// Validate a source configuration before any connection is attempted.
pub fn validate_source(config: &SourceConfig) -> ConfigResult<()> {
    if config.name.trim().is_empty() {
        return Err(invalid("source name must not be empty"));
    }
    if config.host.trim().is_empty() {
        return Err(invalid(format!(
            "source `{}`: host must not be empty",
            config.name
        )));
    }
    if config.server_id == 0 {
        return Err(invalid(format!(
            "source `{}`: server_id must be non-zero",
            config.name
        )));
    }
    if config.databases.is_empty() {
        return Err(invalid(format!(
            "source `{}`: at least one database must be watched",
            config.name
        )));
    }
    for db in &config.databases {
        if db.tables.is_empty() {
            return Err(invalid(format!(
                "source `{}`: database `{}` watches no tables",
                config.name, db.database
            )));
        }
    }
    if config.init_log_file.is_some() != config.init_log_offset.is_some() {
        return Err(invalid(format!(
            "source `{}`: init_log_file and init_log_offset must be set together",
            config.name
        )));
    }
    if config.report_interval_secs == 0 {
        return Err(invalid(format!(
            "source `{}`: report_interval_secs must be non-zero",
            config.name
        )));
    }

    config.skip_op_kinds()?;

    for (list, field) in [
        (&config.skip_delete_tables, "skip_delete_tables"),
        (&config.skip_update_tables, "skip_update_tables"),
    ] {
        for entry in list.iter() {
            if !entry.contains('.') {
                return Err(invalid(format!(
                    "source `{}`: {} entry `{}` must be qualified as schema.table",
                    config.name, field, entry
                )));
            }
        }
    }

    Ok(())
}

/// Validate a set of sources: each valid on its own, names and server ids
/// unique across the set (one dispatch loop instance per server identity).
pub fn validate_sources(sources: &[SourceConfig]) -> ConfigResult<()> {
    let mut names = std::collections::HashSet::new();
    let mut server_ids = std::collections::HashSet::new();

    for source in sources {
        validate_source(source)?;
        if !names.insert(source.name.as_str()) {
            return Err(invalid(format!("duplicate source name `{}`", source.name)));
        }
        if !server_ids.insert(source.server_id) {
            return Err(invalid(format!(
                "duplicate server_id {} (source `{}`)",
                source.server_id, source.name
            )));
        }
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
