use crate::reading::Reading;
use chrono::SecondsFormat;
use std::io;

pub const CSV_HEADER: [&str; 5] = ["timestamp", "deviceId", "moisture", "temperature", "lightLux"];

/// One row per reading, in the order given.
pub fn write_csv<W: io::Write>(readings: &[Reading], writer: W) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(CSV_HEADER)?;
    for reading in readings {
        out.write_record([
            reading
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            reading.device_id.clone(),
            reading.moisture.to_string(),
            reading.temperature.to_string(),
            reading.light_lux.to_string(),
        ])?;
    }
    out.flush()?;
    Ok(())
}

pub fn to_csv_string(readings: &[Reading]) -> Result<String, csv::Error> {
    let mut buf = Vec::new();
    write_csv(readings, &mut buf)?;
    String::from_utf8(buf)
        .map_err(|err| csv::Error::from(io::Error::new(io::ErrorKind::InvalidData, err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::fixtures::reading_at;

    #[test]
    fn empty_snapshot_is_header_only() {
        let csv = to_csv_string(&[]).unwrap();
        assert_eq!(csv, "timestamp,deviceId,moisture,temperature,lightLux\n");
    }

    #[test]
    fn rows_follow_snapshot_order() {
        let mut second = reading_at(2, 90, 33.25);
        second.device_id = "bed, north".to_string();
        let csv = to_csv_string(&[reading_at(1, 0, 41.0), second]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "2026-05-01T12:00:00.000Z,bed-1,41,21,800");
        assert_eq!(lines[2], "2026-05-01T12:01:30.000Z,\"bed, north\",33.25,21,800");
    }
}
