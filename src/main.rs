use std::path::Path;

use gudang::{ColumnSchema, DataType, Database, DatabaseError, Predicate, Value};
use rustyline::{error::ReadlineError, DefaultEditor};

/// Exit codes mirror the error taxonomy so scripts can tell a corrupt
/// file from a missing table.
fn exit_code(err: &DatabaseError) -> i32 {
    match err {
        DatabaseError::Io(_) => 1,
        DatabaseError::CorruptPage { .. }
        | DatabaseError::RecordCorrupt { .. }
        | DatabaseError::InvalidHeader { .. }
        | DatabaseError::InvalidPageSize { .. }
        | DatabaseError::InvalidPageType(_)
        | DatabaseError::PageFull { .. } => 2,
        DatabaseError::KeyNotFound => 3,
        DatabaseError::DuplicateKey { .. } => 4,
        DatabaseError::TableNotFound { .. }
        | DatabaseError::IndexNotFound { .. }
        | DatabaseError::ColumnNotFound { .. } => 5,
        DatabaseError::TableExists { .. }
        | DatabaseError::IndexExists { .. }
        | DatabaseError::TypeMismatch { .. }
        | DatabaseError::InvalidData { .. } => 6,
        DatabaseError::TransactionAborted { .. } => 7,
        DatabaseError::RecoveryFailed { .. } => 8,
        DatabaseError::OutOfSpace => 9,
    }
}

const HELP: &str = r#"
Commands:
  tables                                 list tables
  schema <table>                         show a table definition
  info                                   database header summary
  create table <name> <col:TYPE[:pk]>... create a table
  create index <name> <table> <column>   create an index
  drop table <name> | drop index <name>  drop an object
  set <table> <col>=<value> ...          insert or update a row
  get <table> [col ...] [where <col> <op> <value>]
  del <table> where <col> <op> <value>   delete matching rows
  begin | commit | rollback              transaction control
  help, exit
Values: integers, reals, 'quoted text', null.
"#;

fn parse_value(token: &str) -> Value {
    if token.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(i) = token.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(r) = token.parse::<f64>() {
        return Value::Real(r);
    }
    Value::Text(token.trim_matches('\'').to_string())
}

fn parse_predicate(tokens: &[&str]) -> Result<Predicate, String> {
    let [column, op, value] = tokens else {
        return Err("expected: where <col> <op> <value>".to_string());
    };
    let value = parse_value(value);
    let predicate = match *op {
        "=" | "==" => Predicate::eq(*column, value),
        "!=" | "<>" => Predicate::ne(*column, value),
        "<" => Predicate::lt(*column, value),
        "<=" => Predicate::le(*column, value),
        ">" => Predicate::gt(*column, value),
        ">=" => Predicate::ge(*column, value),
        other => return Err(format!("unknown operator '{other}'")),
    };
    Ok(predicate)
}

fn parse_column(spec: &str) -> Result<ColumnSchema, String> {
    let mut parts = spec.split(':');
    let name = parts.next().unwrap_or_default();
    if name.is_empty() {
        return Err(format!("bad column spec '{spec}'"));
    }
    let type_str = parts.next().unwrap_or("TEXT");
    let data_type = DataType::from_string(type_str).map_err(|e| e.to_string())?;
    let mut column = ColumnSchema::new(name, data_type, 0);
    for modifier in parts {
        match modifier.to_ascii_lowercase().as_str() {
            "pk" => column = column.primary_key(),
            "notnull" => column = column.not_null(),
            "unique" => column = column.unique(),
            other => return Err(format!("unknown column modifier '{other}'")),
        }
    }
    Ok(column)
}

fn run_command(db: &mut Database, line: &str) -> Result<bool, DatabaseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.as_slice() {
        [] => {}
        ["exit"] | ["quit"] | ["q"] => return Ok(false),
        ["help"] | ["h"] => println!("{HELP}"),
        ["tables"] => {
            for name in db.table_names() {
                println!("{name}");
            }
        }
        ["schema", table] => match db.table_schema(table) {
            Some(schema) => println!("{}", schema.definition),
            None => println!("no such table: {table}"),
        },
        ["info"] => {
            let header = db.header();
            println!("page size:      {}", header.page_size);
            println!("page count:     {}", header.page_count);
            println!("freelist pages: {}", header.freelist_count);
            println!("schema root:    {}", header.schema_root);
            println!("change counter: {}", header.change_counter);
        }
        ["begin"] => db.begin()?,
        ["commit"] => db.commit()?,
        ["rollback"] => db.rollback()?,
        ["create", "table", name, specs @ ..] if !specs.is_empty() => {
            let mut columns = Vec::new();
            for spec in specs {
                match parse_column(spec) {
                    Ok(column) => columns.push(column),
                    Err(msg) => {
                        println!("{msg}");
                        return Ok(true);
                    }
                }
            }
            db.create_table(name, columns)?;
            println!("created table {name}");
        }
        ["create", "index", name, table, column] => {
            db.create_index(name, table, column)?;
            println!("created index {name}");
        }
        ["drop", "table", name] => {
            db.drop_table(name)?;
            println!("dropped table {name}");
        }
        ["drop", "index", name] => {
            db.drop_index(name)?;
            println!("dropped index {name}");
        }
        ["set", table, assignments @ ..] if !assignments.is_empty() => {
            let mut fields = Vec::new();
            let mut values = Vec::new();
            for assignment in assignments {
                let Some((field, value)) = assignment.split_once('=') else {
                    println!("usage: set <table> <col>=<value> ...");
                    return Ok(true);
                };
                fields.push(field);
                values.push(parse_value(value));
            }
            let row_id = db.set(table, &fields, values)?;
            println!("row {row_id}");
        }
        ["get", table, rest @ ..] => {
            let (fields, filters) = match rest.iter().position(|t| *t == "where") {
                Some(at) => match parse_predicate(&rest[at + 1..]) {
                    Ok(predicate) => (&rest[..at], vec![predicate]),
                    Err(msg) => {
                        println!("{msg}");
                        return Ok(true);
                    }
                },
                None => (rest, Vec::new()),
            };
            let rows = db.get(table, fields, &filters)?;
            for row in &rows {
                let rendered: Vec<String> = row.values.iter().map(|v| v.to_string()).collect();
                println!("{}|{}", row.row_id.unwrap_or_default(), rendered.join("|"));
            }
            println!("({} row(s))", rows.len());
        }
        ["del", table, "where", rest @ ..] => match parse_predicate(rest) {
            Ok(predicate) => {
                let removed = db.delete_rows(table, &[predicate])?;
                println!("({removed} row(s) deleted)");
            }
            Err(msg) => println!("{msg}"),
        },
        _ => println!("unrecognized command; try 'help'"),
    }
    Ok(true)
}

fn main() {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "gudang.db".to_string());
    let result = if Path::new(&path).exists() {
        println!("Opening database at {path}");
        Database::open(&path)
    } else {
        println!("Creating database at {path}");
        Database::create(&path)
    };
    let mut db = match result {
        Ok(db) => db,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(exit_code(&err));
        }
    };

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };
    let _ = rl.load_history("history.txt");

    loop {
        match rl.readline("gudang> ") {
            Ok(line) => {
                let command = line.trim().to_string();
                if command.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&command);
                match run_command(&mut db, &command) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => println!("error: {err}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted");
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("error: {err:?}");
                break;
            }
        }
    }
    let _ = rl.save_history("history.txt");
}
