//! Command Translator: dot-commands to DDL / DML.

use crate::ast::{ColumnDef, Command};
use crate::error::{KqlError, KqlResult};
use crate::transpiler::traits::quote_string;
use crate::transpiler::Transpiler;

pub struct CommandTranslator<'a> {
    transpiler: &'a Transpiler,
}

impl<'a> CommandTranslator<'a> {
    pub fn new(transpiler: &'a Transpiler) -> Self {
        Self { transpiler }
    }

    fn quote(&self, name: &str) -> String {
        self.transpiler.dialect().quote_identifier(name)
    }

    pub fn translate(&self, command: &Command) -> KqlResult<String> {
        tracing::debug!(command = command.keyword(), "translating command");
        let dialect = self.transpiler.dialect();
        match command {
            Command::IngestInline { table, data } => self.insert_rows(table, data),
            Command::IngestFile {
                table,
                path,
                format,
                header,
            } => dialect.copy_from(&self.quote(table), path, *format, *header),
            Command::View { name, query } => Ok(format!(
                "CREATE VIEW {} AS {}",
                self.quote(name),
                self.transpiler.convert(query)?
            )),
            Command::CreateTable { table, columns } => self.create_table(table, columns),
            Command::DropTable { table, if_exists } => Ok(format!(
                "DROP TABLE {}{}",
                if *if_exists { "IF EXISTS " } else { "" },
                self.quote(table)
            )),
            Command::Set { table, query } => Ok(format!(
                "CREATE TABLE {} AS {}",
                self.quote(table),
                self.transpiler.convert(query)?
            )),
            Command::Append { table, query } => Ok(format!(
                "INSERT INTO {} {}",
                self.quote(table),
                self.transpiler.convert(query)?
            )),
        }
    }

    /// One multi-row `INSERT` for the comma-separated lines of an inline ingest.
    fn insert_rows(&self, table: &str, data: &str) -> KqlResult<String> {
        let rows: Vec<String> = data
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let fields: Vec<String> = line.split(',').map(field_literal).collect();
                format!("({})", fields.join(", "))
            })
            .collect();
        if rows.is_empty() {
            return Err(KqlError::unsupported(
                "malformed command: .ingest inline without rows",
            ));
        }
        Ok(format!(
            "INSERT INTO {} VALUES {}",
            self.quote(table),
            rows.join(", ")
        ))
    }

    fn create_table(&self, table: &str, columns: &[ColumnDef]) -> KqlResult<String> {
        let dialect = self.transpiler.dialect();
        let defs = columns
            .iter()
            .map(|c| Ok(format!("{} {}", self.quote(&c.name), dialect.map_type(&c.ty)?)))
            .collect::<KqlResult<Vec<_>>>()?;
        Ok(format!("CREATE TABLE {} ({})", self.quote(table), defs.join(", ")))
    }
}

fn field_literal(field: &str) -> String {
    let field = field.trim();
    if field.is_empty() {
        "NULL".to_string()
    } else if is_numeric(field) {
        field.to_string()
    } else {
        quote_string(field)
    }
}

/// `-?digits(.digits)?`
fn is_numeric(field: &str) -> bool {
    let digits = field.strip_prefix('-').unwrap_or(field);
    let (whole, fraction) = match digits.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (digits, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    all_digits(whole) && fraction.map_or(true, all_digits)
}
