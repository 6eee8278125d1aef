use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};

pub const HISTORY_DATE_FORMAT: &str = "%d/%m/%y";
pub const ALERT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const CLOCK_FORMAT: &str = "%H:%M";

pub fn history_date(at: NaiveDateTime) -> String {
    at.format(HISTORY_DATE_FORMAT).to_string()
}

pub fn alert_date(at: NaiveDateTime) -> String {
    at.format(ALERT_DATE_FORMAT).to_string()
}

pub fn clock_time(at: NaiveDateTime) -> String {
    at.format(CLOCK_FORMAT).to_string()
}

/// Parse a `DD/MM/YY` history date. Two-digit years are taken as 20YY and a
/// four-digit year is accepted as-is.
pub fn parse_history_date(value: &str) -> Result<NaiveDate> {
    let parts: Vec<&str> = value.trim().split('/').collect();
    let [day, month, year] = parts.as_slice() else {
        bail!("date '{value}' is not DD/MM/YY");
    };

    let day: u32 = day.parse().with_context(|| format!("bad day in '{value}'"))?;
    let month: u32 = month
        .parse()
        .with_context(|| format!("bad month in '{value}'"))?;
    let year: i32 = match year.len() {
        2 => 2000 + year.parse::<i32>().with_context(|| format!("bad year in '{value}'"))?,
        4 => year.parse().with_context(|| format!("bad year in '{value}'"))?,
        _ => bail!("bad year in '{value}'"),
    };

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| anyhow!("'{value}' is not a calendar date"))
}

pub fn month_name(month: u32) -> String {
    let name = match month {
        1 => "Enero",
        2 => "Febrero",
        3 => "Marzo",
        4 => "Abril",
        5 => "Mayo",
        6 => "Junio",
        7 => "Julio",
        8 => "Agosto",
        9 => "Septiembre",
        10 => "Octubre",
        11 => "Noviembre",
        12 => "Diciembre",
        other => return format!("Mes {other:02}"),
    };
    name.to_string()
}
