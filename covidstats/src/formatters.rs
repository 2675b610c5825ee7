use anyhow::{anyhow, Result};
use enum_dispatch::enum_dispatch;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Value;
use std::io::Cursor;
use std::io::Write;

/// Utility function to convert from polars `AnyValue` to `serde_json::Value`
/// Covers the types a report dataframe can hold.
fn any_value_to_json(value: &AnyValue) -> Result<Value> {
    match value {
        AnyValue::Null => Ok(Value::Null),
        AnyValue::Boolean(b) => Ok(Value::Bool(*b)),
        AnyValue::String(s) => Ok(Value::String((*s).to_string())),
        AnyValue::Int32(n) => Ok(json!(*n)),
        AnyValue::Int64(n) => Ok(json!(*n)),
        AnyValue::UInt32(n) => Ok(json!(*n)),
        AnyValue::UInt64(n) => Ok(json!(*n)),
        // Non-finite floats have no JSON representation
        AnyValue::Float64(n) if !n.is_finite() => Ok(Value::Null),
        AnyValue::Float64(n) => Ok(json!(*n)),
        AnyValue::Date(d) => Ok(json!(d.to_string())),
        _ => Err(anyhow!("Failed to convert type")),
    }
}

/// One JSON object per dataframe row, keyed by column name.
fn rows_to_json(df: &DataFrame) -> Result<Vec<Value>> {
    (0..df.height())
        .map(|idx| {
            let mut object = serde_json::Map::new();
            for col in df.get_columns() {
                let val = any_value_to_json(&col.get(idx)?)?;
                object.insert(col.name().to_string(), val);
            }
            Ok(Value::Object(object))
        })
        .collect()
}

/// Trait to define different output generators. Defines two
/// functions, format which generates a serialized string of the
/// `DataFrame` and save which writes the same output to a writer
#[enum_dispatch]
pub trait OutputGenerator {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()>;
    fn format(&self, df: &mut DataFrame) -> Result<String> {
        // Just creating an empty vec to store the buffered output
        let mut data: Vec<u8> = vec![];
        let mut buff = Cursor::new(&mut data);
        self.save(&mut buff, df)?;

        Ok(String::from_utf8(data)?)
    }
}

/// Enum of OutputFormatters one for each potential
/// output type
#[enum_dispatch(OutputGenerator)]
#[derive(Serialize, Deserialize, Debug)]
pub enum OutputFormatter {
    Csv(CsvFormatter),
    Json(JsonFormatter),
    JsonLines(JsonLinesFormatter),
}

/// Format the report as a CSV file with a header row
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct CsvFormatter;

impl OutputGenerator for CsvFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        CsvWriter::new(writer).finish(df)?;
        Ok(())
    }
}

/// Format the report as a single JSON array of row objects
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct JsonFormatter;

impl OutputGenerator for JsonFormatter {
    fn format(&self, df: &mut DataFrame) -> Result<String> {
        Ok(Value::Array(rows_to_json(df)?).to_string())
    }

    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        let result = self.format(df)?;
        writer.write_all(result.as_bytes())?;
        Ok(())
    }
}

/// Format the report as one JSON object per line
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct JsonLinesFormatter;

impl OutputGenerator for JsonLinesFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        for row in rows_to_json(df)? {
            writeln!(writer, "{row}")?;
        }
        Ok(())
    }
}
