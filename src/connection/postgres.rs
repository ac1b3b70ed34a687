use std::error::Error;
use std::sync::Arc;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use fallible_iterator::FallibleIterator;
use postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use postgres::{Client, NoTls};

use crate::config::ServerCredentials;
use crate::error::DbError;
use crate::results::{Columns, Row};
use crate::statement::PreparedSql;
use crate::types::Value;

pub(super) fn open(server: &ServerCredentials) -> Result<Client, DbError> {
    let mut config = postgres::Config::new();
    config
        .host(&server.host)
        .port(server.port)
        .dbname(&server.database)
        .user(&server.username)
        .connect_timeout(server.connect_timeout);
    if !server.password.is_empty() {
        config.password(&server.password);
    }
    config.connect(NoTls).map_err(|e| {
        DbError::Connection(format!(
            "failed to connect to {}:{}/{}: {e}",
            server.host, server.port, server.database
        ))
    })
}

pub(super) fn ping(client: &mut Client) -> Result<(), DbError> {
    client
        .batch_execute("SELECT 1")
        .map_err(|e| DbError::Connection(format!("ping failed: {e}")))
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            // narrow to the column's integer width; the server rejects a mismatched size
            Value::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            #[allow(clippy::cast_possible_truncation)]
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            Value::Text(s) => s.to_sql(ty, out),
            Value::Bool(b) => b.to_sql(ty, out),
            // naive timestamps are taken as UTC
            Value::Timestamp(dt) => match *ty {
                Type::TIMESTAMPTZ => Utc.from_utc_datetime(dt).to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
            Value::Blob(bytes) => bytes.to_sql(ty, out),
            Value::Json(json) => json.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::JSON
                | Type::JSONB
                | Type::BYTEA
        )
    }

    to_sql_checked!();
}

fn extract_value(row: &postgres::Row, idx: usize) -> Result<Value, postgres::Error> {
    let type_name = row.columns()[idx].type_().name();
    let value = match type_name {
        "int2" => row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Int(i64::from(v))),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Int(i64::from(v))),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::Float(f64::from(v))),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(Value::Timestamp),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| Value::Timestamp(v.naive_utc())),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(Value::Json),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Blob),
        _ => row.try_get::<_, Option<String>>(idx)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

pub(super) fn execute(client: &mut Client, prepared: &PreparedSql<'_>) -> Result<u64, DbError> {
    let refs: Vec<&(dyn ToSql + Sync)> = prepared
        .params()
        .iter()
        .map(|v| v as &(dyn ToSql + Sync))
        .collect();
    client
        .execute(prepared.text.as_ref(), &refs[..])
        .map_err(|e| prepared.execution_error(e))
}

pub(super) fn for_each_row(
    client: &mut Client,
    prepared: &PreparedSql<'_>,
    on_row: &mut dyn FnMut(Row) -> Result<(), DbError>,
) -> Result<Vec<String>, DbError> {
    let statement = client
        .prepare(prepared.text.as_ref())
        .map_err(|e| prepared.execution_error(e))?;
    let names: Vec<String> = statement
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let columns = Arc::new(Columns::new(names.clone()));

    let mut rows = client
        .query_raw(&statement, prepared.params().iter())
        .map_err(|e| prepared.execution_error(e))?;
    while let Some(row) = rows.next().map_err(|e| prepared.execution_error(e))? {
        let mut row_values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            row_values.push(extract_value(&row, idx).map_err(|e| prepared.execution_error(e))?);
        }
        on_row(Row::new(Arc::clone(&columns), row_values))?;
    }
    Ok(names)
}
