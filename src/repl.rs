use crate::bulk::{BatchOutcome, InsertOptions};
use crate::codec::{self, Dialect};
use crate::config::Config;
use crate::core::db::{Execution, Session};
use crate::core::{AdminError, Result};
use std::io::{self, BufRead, Write};
use tracing::warn;

/// Result of one REPL command: an optional message to print.
pub type CommandResult = Result<Option<String>>;

/// Represents a parsed REPL command.
#[derive(Debug, PartialEq)]
pub enum Command {
    Open(String),
    Close,
    Tables,
    Browse(String),
    Schema(String),
    Filter(Option<String>),
    Sort(Option<String>),
    Reset,
    Refresh,
    Import(String),
    Export(String),
    Paste,
    Copy(Vec<usize>),
    Delete(Vec<usize>),
    Insert(String),
    Set {
        row: usize,
        column: String,
        value: String,
    },
    Pending,
    Submit,
    Revert,
    Help,
    Quit,
    Sql(String),
    Unknown(String),
}

/// Parses a user input string into a corresponding `Command`.
///
/// If the input starts with a colon (`:`), it is interpreted as a command.
/// Otherwise, it is treated as a SQL statement.
pub fn parse_command(input: &str) -> Command {
    let input = input.trim();
    let Some(trimmed) = input.strip_prefix(':') else {
        return Command::Sql(input.to_string());
    };
    let (name, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (trimmed, ""),
    };
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    match (name, argument) {
        ("open", Some(path)) => Command::Open(path),
        ("close", None) => Command::Close,
        ("tables", None) => Command::Tables,
        ("browse", Some(table)) => Command::Browse(table),
        ("schema", Some(table)) => Command::Schema(table),
        ("filter", condition) => Command::Filter(condition),
        ("sort", order) => Command::Sort(order),
        ("reset", None) => Command::Reset,
        ("refresh", None) => Command::Refresh,
        ("import", Some(path)) => Command::Import(path),
        ("export", Some(path)) => Command::Export(path),
        ("paste", None) => Command::Paste,
        ("copy", Some(rows)) => parse_rows(&rows).map_or_else(|| Command::Unknown(input.to_string()), Command::Copy),
        ("delete", Some(rows)) => parse_rows(&rows).map_or_else(|| Command::Unknown(input.to_string()), Command::Delete),
        ("insert", Some(values)) => Command::Insert(values),
        ("set", Some(args)) => parse_set(&args).unwrap_or_else(|| Command::Unknown(input.to_string())),
        ("pending", None) => Command::Pending,
        ("submit", None) => Command::Submit,
        ("revert", None) => Command::Revert,
        ("help", None) => Command::Help,
        ("quit", None) | ("q", None) => Command::Quit,
        _ => Command::Unknown(input.to_string()),
    }
}

/// Parses a row list such as `0,2 5`.
fn parse_rows(text: &str) -> Option<Vec<usize>> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().ok())
        .collect()
}

/// Parses `<row> <column> <value...>`; the value may contain spaces.
fn parse_set(args: &str) -> Option<Command> {
    let (row, rest) = args.split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    let (column, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    Some(Command::Set {
        row: row.parse().ok()?,
        column: column.to_string(),
        value: value.trim().to_string(),
    })
}

const HELP: &str = "\
:open <path>        open a SQLite database
:close              close the database
:tables             list tables
:browse <table>     load a table
:schema <table>     show columns and primary key
:filter [cond]      set (or clear) the WHERE condition
:sort [expr]        set (or clear) the ORDER BY expression
:reset              clear filter and sort
:refresh            reload the current table
:import <file>      import a CSV file into the current table
:export <file>      write the current result as CSV
:paste              insert tab-separated lines, end with a single '.'
:copy <rows>        print rows as clipboard text
:delete <rows>      delete rows of the current result
:insert <v1,v2,..>  insert one row (CSV syntax)
:set <row> <col> <value>  edit a cell (column by name or index)
:pending            list edits not yet submitted
:submit             write pending edits in one transaction
:revert             drop pending edits
:quit               exit
anything else       executed as SQL";

/// Interactive front end holding the session and the configured behavior.
pub struct Repl {
    session: Option<Session>,
    refresh_after_mutation: bool,
    insert_options: InsertOptions,
}

impl Repl {
    pub fn new(session: Option<Session>, config: &Config) -> Self {
        let insert_options = config.import.insert_options();
        let session = session.map(|mut s| {
            s.set_insert_options(insert_options);
            s
        });
        Repl {
            session,
            refresh_after_mutation: config.session.refresh_after_mutation,
            insert_options,
        }
    }

    fn session(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or_else(|| AdminError::Driver {
            message: "no open database connection; use :open <path>".to_string(),
            sql: String::new(),
        })
    }

    /// Runs one command. `input` supplies the lines of a `:paste` block.
    pub fn handle<R: BufRead>(&mut self, command: Command, input: &mut R) -> CommandResult {
        match command {
            Command::Open(path) => {
                let mut session = Session::open(&path)?;
                session.set_insert_options(self.insert_options);
                if let Some(mut previous) = self.session.replace(session) {
                    previous.close()?;
                }
                Ok(Some(format!("Connected to {}", path)))
            }
            Command::Close => {
                if let Some(mut session) = self.session.take() {
                    session.close()?;
                }
                Ok(Some("Disconnected".to_string()))
            }
            Command::Tables => Ok(Some(self.session()?.tables()?.join("\n"))),
            Command::Browse(table) => Ok(Some(self.session()?.browse(&table)?.render())),
            Command::Schema(table) => {
                let schema = self.session()?.schema(&table)?;
                let mut lines: Vec<String> = schema
                    .columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.declared_type))
                    .collect();
                lines.push(format!(
                    "primary key: {}",
                    schema.primary_key.as_deref().unwrap_or("<none>")
                ));
                Ok(Some(lines.join("\n")))
            }
            Command::Filter(condition) => Ok(Some(self.session()?.set_filter(condition)?.render())),
            Command::Sort(order) => Ok(Some(self.session()?.set_sort(order)?.render())),
            Command::Reset => Ok(Some(self.session()?.reset_view()?.render())),
            Command::Refresh => Ok(Some(self.session()?.refresh()?.render())),
            Command::Import(path) => {
                let outcome = self.session()?.import_csv(&path)?;
                Ok(Some(format!("Imported {} rows from {}", outcome.succeeded, path)))
            }
            Command::Export(path) => {
                let rows = self.session()?.export_csv(&path)?;
                Ok(Some(format!("Exported {} rows to {}", rows, path)))
            }
            Command::Paste => {
                let text = read_block(input)?;
                let outcome = self.session()?.paste(&text)?;
                Ok(Some(describe_insert(&outcome)))
            }
            Command::Copy(rows) => {
                let session = self.session()?;
                let columns = session.current_result().column_count();
                let cells: Vec<(usize, usize)> = rows
                    .iter()
                    .flat_map(|&row| (0..columns).map(move |col| (row, col)))
                    .collect();
                Ok(Some(session.copy_selection(&cells)?))
            }
            Command::Delete(rows) => {
                let outcome = self.session()?.delete_rows(&rows)?;
                Ok(Some(format!("Deleted {} rows", outcome.succeeded)))
            }
            Command::Insert(values) => {
                let record = codec::decode_line(&values, &Dialect::CSV);
                let outcome = self.session()?.insert_row(record)?;
                Ok(Some(describe_insert(&outcome)))
            }
            Command::Set { row, column, value } => {
                let session = self.session()?;
                let result = session.current_result();
                let col = column
                    .parse::<usize>()
                    .ok()
                    .or_else(|| result.column_index(&column))
                    .ok_or_else(|| {
                        AdminError::SchemaUnavailable(format!(
                            "no column '{}' in the current result",
                            column
                        ))
                    })?;
                session.set_cell(row, col, value)?;
                Ok(Some(format!("{} pending edits", session.pending_edits().len())))
            }
            Command::Pending => {
                let edits = self.session()?.pending_edits();
                if edits.is_empty() {
                    return Ok(Some("No pending edits".to_string()));
                }
                let lines: Vec<String> = edits
                    .iter()
                    .map(|e| format!("key {}: {} = {}", e.key, e.column, e.value))
                    .collect();
                Ok(Some(lines.join("\n")))
            }
            Command::Submit => {
                let outcome = self.session()?.submit_changes()?;
                Ok(Some(format!("Saved {} edits", outcome.succeeded)))
            }
            Command::Revert => {
                let dropped = self.session()?.revert_changes()?;
                Ok(Some(format!("Discarded {} edits", dropped)))
            }
            Command::Help => Ok(Some(HELP.to_string())),
            Command::Quit => Ok(None),
            Command::Sql(sql) => {
                let refresh = self.refresh_after_mutation;
                let session = self.session()?;
                let execution = if refresh {
                    session.execute_and_refresh(&sql)?
                } else {
                    session.execute(&sql)?
                };
                Ok(Some(match execution {
                    Execution::Rows(result) => {
                        format!("{}({} rows)", result.render(), result.row_count())
                    }
                    Execution::Affected(count) => format!("Query OK, {} rows affected", count),
                }))
            }
            Command::Unknown(input) => Ok(Some(format!(
                "Unknown command: {} (type :help for a list)",
                input
            ))),
        }
    }
}

fn describe_insert(outcome: &BatchOutcome) -> String {
    format!("Inserted {} rows", outcome.succeeded)
}

/// Reads lines up to a line holding a single `.`, or end of input.
fn read_block<R: BufRead>(input: &mut R) -> Result<String> {
    let mut block = String::new();
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 || line.trim_end() == "." {
            break;
        }
        block.push_str(&line);
    }
    Ok(block)
}

/// Runs the REPL on standard input until `:quit` or end of input.
pub fn run_repl(session: Option<Session>, config: &Config) -> Result<()> {
    let mut repl = Repl::new(session, config);
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut stdout = io::stdout();

    writeln!(stdout, "Welcome to the dbadmin REPL! Type :help for commands, :quit to exit.")?;
    let mut line = String::new();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let command = parse_command(&line);
        if command == Command::Quit {
            break;
        }
        match repl.handle(command, &mut input) {
            Ok(Some(message)) => writeln!(stdout, "{}", message)?,
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "command failed");
                writeln!(stdout, "Error: {}", e)?;
            }
        }
    }
    Ok(())
}
