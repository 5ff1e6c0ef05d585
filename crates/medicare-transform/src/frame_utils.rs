//! Small DataFrame helpers shared by the transform stages.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use polars::prelude::{
    BooleanChunked, Column, DataFrame, DataType, IdxCa, IntoLazy, JoinArgs, JoinType, NamedFrom,
    NewChunkedArray, PolarsError, Series, col,
};

use medicare_model::Result;

/// Days from 0001-01-01 (CE) to the 1970-01-01 epoch polars dates count from.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Read a column as strings, casting scalars to their textual form.
pub fn string_values(column: &Column) -> Result<Vec<Option<String>>> {
    let casted = column.cast(&DataType::String)?;
    let ca = casted.str()?;
    Ok(ca.into_iter().map(|v| v.map(ToString::to_string)).collect())
}

/// Read a column as integers, casting numeric types as needed.
pub fn int_values(column: &Column) -> Result<Vec<Option<i64>>> {
    let casted = column.cast(&DataType::Int64)?;
    let ca = casted.i64()?;
    Ok(ca.into_iter().collect())
}

/// Read a column as dates. Accepts date, datetime and ISO `%Y-%m-%d` string
/// columns; anything else is a data error.
pub fn date_values(column: &Column) -> Result<Vec<Option<NaiveDate>>> {
    match column.dtype() {
        DataType::Date => date_values_physical(column),
        DataType::Datetime(_, _) => {
            let casted = column.cast(&DataType::Date)?;
            date_values_physical(&casted)
        }
        DataType::String => {
            let ca = column.str()?;
            Ok(ca
                .into_iter()
                .map(|v| v.and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
                .collect())
        }
        other => Err(PolarsError::ComputeError(
            format!("column `{}` has dtype {other}, expected a date", column.name()).into(),
        )
        .into()),
    }
}

fn date_values_physical(column: &Column) -> Result<Vec<Option<NaiveDate>>> {
    let ca = column.as_materialized_series().date()?;
    Ok(ca
        .physical()
        .into_iter()
        .map(|v| v.and_then(|days| NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE)))
        .collect())
}

/// Keep only the rows whose mask entry is true.
pub fn filter_rows(frame: &DataFrame, mask: &[bool]) -> Result<DataFrame> {
    let ca = BooleanChunked::from_slice("mask".into(), mask);
    Ok(frame.filter(&ca)?)
}

/// Boolean column from plain values.
pub fn bool_column(name: &str, values: Vec<bool>) -> Column {
    Series::new(name.into(), values).into()
}

/// Keep rows whose `key` value appears in `ids`.
pub fn semi_join(frame: DataFrame, key: &str, ids: &Series) -> Result<DataFrame> {
    let ids = DataFrame::new(vec![ids.clone().with_name(key.into()).into()])?;
    let out = frame
        .lazy()
        .join(
            ids.lazy(),
            [col(key)],
            [col(key)],
            JoinArgs::new(JoinType::Semi),
        )
        .collect()?;
    Ok(out)
}

/// Stack frames row-wise, unioning columns. Columns absent from a frame are
/// filled with nulls of the dtype they carry where first seen.
pub fn concat_rows(frames: Vec<DataFrame>) -> Result<DataFrame> {
    let mut order: Vec<String> = Vec::new();
    let mut dtypes: BTreeMap<String, DataType> = BTreeMap::new();
    for frame in &frames {
        for column in frame.get_columns() {
            let name = column.name().to_string();
            if !dtypes.contains_key(&name) {
                order.push(name.clone());
                dtypes.insert(name, column.dtype().clone());
            }
        }
    }

    let mut stacked: Option<DataFrame> = None;
    for frame in frames {
        let height = frame.height();
        let mut columns = Vec::with_capacity(order.len());
        for name in &order {
            match frame.column(name) {
                Ok(column) => columns.push(column.clone()),
                Err(_) => columns.push(
                    Series::full_null(name.as_str().into(), height, &dtypes[name]).into(),
                ),
            }
        }
        let aligned = DataFrame::new(columns)?;
        stacked = match stacked {
            None => Some(aligned),
            Some(mut acc) => {
                acc.vstack_mut(&aligned)?;
                Some(acc)
            }
        };
    }
    Ok(stacked.unwrap_or_default())
}

/// Drop duplicate keys, keeping the first occurrence in row order.
pub fn dedup_first(frame: &DataFrame, keys: &[&str]) -> Result<DataFrame> {
    let mut key_values = Vec::with_capacity(keys.len());
    for key in keys {
        key_values.push(string_values(frame.column(key)?)?);
    }
    let mut seen = HashSet::new();
    let mut take = Vec::new();
    for row in 0..frame.height() {
        let key: Vec<Option<String>> = key_values.iter().map(|v| v[row].clone()).collect();
        if seen.insert(key) {
            take.push(row as u32);
        }
    }
    if take.len() == frame.height() {
        return Ok(frame.clone());
    }
    let idx = IdxCa::from_vec("idx".into(), take);
    Ok(frame.take(&idx)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_values_cast_scalars() {
        let column: Column = Series::new("sex".into(), vec![1i64, 2]).into();
        let values = string_values(&column).unwrap();
        assert_eq!(values, vec![Some("1".to_string()), Some("2".to_string())]);
    }

    #[test]
    fn date_values_parse_strings() {
        let column: Column =
            Series::new("dob".into(), vec![Some("1936-02-29"), None, Some("bogus")]).into();
        let values = date_values(&column).unwrap();
        assert_eq!(values[0], NaiveDate::from_ymd_opt(1936, 2, 29));
        assert_eq!(values[1], None);
        assert_eq!(values[2], None);
    }

    #[test]
    fn concat_rows_unions_columns() {
        let a = DataFrame::new(vec![
            Series::new("id".into(), vec!["a"]).into(),
            Series::new("ehic".into(), vec!["e1"]).into(),
        ])
        .unwrap();
        let b = DataFrame::new(vec![Series::new("id".into(), vec!["b"]).into()]).unwrap();
        let out = concat_rows(vec![a, b]).unwrap();
        assert_eq!(out.height(), 2);
        let ehic = out.column("ehic").unwrap();
        assert_eq!(ehic.null_count(), 1);
    }

    #[test]
    fn dedup_keeps_first() {
        let frame = DataFrame::new(vec![
            Series::new("id".into(), vec!["a", "a", "b"]).into(),
            Series::new("value".into(), vec![1i64, 2, 3]).into(),
        ])
        .unwrap();
        let out = dedup_first(&frame, &["id"]).unwrap();
        assert_eq!(out.height(), 2);
        let values = int_values(out.column("value").unwrap()).unwrap();
        assert_eq!(values, vec![Some(1), Some(3)]);
    }
}
