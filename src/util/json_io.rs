use anyhow::Context;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::fs::File;
use std::path::Path;

/// True if the path ends in `.gz`
fn is_gzipped(filename: &Path) -> bool {
    filename.extension().unwrap_or_default() == "gz"
}

/// Opens a file for buffered reading, transparently decompressing `.gz` files
/// # Arguments
/// * `filename` - the file path to open
/// # Errors
/// * if the file does not open properly
pub fn open_reader(filename: &Path) -> anyhow::Result<Box<dyn BufRead + Send>> {
    let file = File::open(filename)
        .with_context(|| format!("Error while opening {filename:?}:"))?;
    let reader: Box<dyn BufRead + Send> = if is_gzipped(filename) {
        Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}

/// Destination of an output file, compressed when the path ends in `.gz`
pub enum OutputStream {
    Plain(File),
    Gzip(GzEncoder<File>)
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            OutputStream::Plain(f) => f.write(buf),
            OutputStream::Gzip(e) => e.write(buf)
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            OutputStream::Plain(f) => f.flush(),
            OutputStream::Gzip(e) => e.flush()
        }
    }
}

impl OutputStream {
    /// Flushes the stream, writing the gzip trailer if compressed
    pub fn finish(self) -> std::io::Result<()> {
        match self {
            OutputStream::Plain(mut f) => f.flush(),
            OutputStream::Gzip(e) => e.finish().map(|_| ())
        }
    }
}

/// Buffered writer returned by [`open_writer`]
pub type OutputWriter = BufWriter<OutputStream>;

/// Opens a file for buffered writing, compressing if the path ends in `.gz`
/// # Arguments
/// * `out_filename` - user provided path to write to
/// # Errors
/// * if the file cannot be created
pub fn open_writer(out_filename: &Path) -> anyhow::Result<OutputWriter> {
    let file = File::create(out_filename)
        .with_context(|| format!("Error while creating {out_filename:?}:"))?;
    let inner = if is_gzipped(out_filename) {
        OutputStream::Gzip(GzEncoder::new(file, Compression::default()))
    } else {
        OutputStream::Plain(file)
    };
    Ok(BufWriter::new(inner))
}

/// Flushes and closes a writer from [`open_writer`]; dropping one instead would hide trailer errors
/// # Errors
/// * if any buffered data or the gzip trailer cannot be written
pub fn finish_writer(writer: OutputWriter, out_filename: &Path) -> anyhow::Result<()> {
    writer.into_inner()
        .map_err(|e| e.into_error())
        .and_then(|stream| stream.finish())
        .with_context(|| format!("Error while finishing output to {out_filename:?}:"))?;
    Ok(())
}

/// Helper function that loads a file into some type, helpful generic
/// # Arguments
/// * `filename` - the file path to open and parse
/// # Errors
/// * if the file does not open properly
/// * if the deserialization throws errors
pub fn load_json<T: serde::de::DeserializeOwned>(filename: &Path) -> anyhow::Result<T> {
    let fp = open_reader(filename)?;
    let result: T = serde_json::from_reader(fp)
        .with_context(|| format!("Error while deserializing {filename:?}:"))?;
    Ok(result)
}

/// This will save a generic serializable struct to JSON.
/// # Arguments
/// * `data` - the data in memory
/// * `out_filename` - user provided path to write to
/// # Errors
/// * if opening or writing to the file throw errors
/// * if JSON serialization throws errors
pub fn save_json<T: serde::Serialize>(data: &T, out_filename: &Path) -> anyhow::Result<()> {
    let mut writer = open_writer(out_filename)?;
    serde_json::to_writer_pretty(&mut writer, data)
        .with_context(|| format!("Error while serializing {out_filename:?}:"))?;
    finish_writer(writer, out_filename)
}

/// Loads a newline-delimited JSON file, one record per non-blank line
/// # Arguments
/// * `filename` - the file path to open and parse
/// # Errors
/// * if the file does not open properly
/// * if any line fails to deserialize
pub fn load_ndjson<T: serde::de::DeserializeOwned>(filename: &Path) -> anyhow::Result<Vec<T>> {
    let reader = open_reader(filename)?;
    let mut records = vec![];
    for (line_index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Error while reading {filename:?}:"))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: T = serde_json::from_str(&line)
            .with_context(|| format!("Error while deserializing line {} of {filename:?}:", line_index + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Writes records as newline-delimited JSON
/// # Arguments
/// * `data` - the records to write, one per line
/// * `out_filename` - user provided path to write to
/// # Errors
/// * if opening or writing to the file throw errors
pub fn save_ndjson<'a, T: serde::Serialize + 'a>(data: impl IntoIterator<Item = &'a T>, out_filename: &Path) -> anyhow::Result<()> {
    let mut writer = open_writer(out_filename)?;
    for record in data.into_iter() {
        serde_json::to_writer(&mut writer, record)
            .with_context(|| format!("Error while serializing {out_filename:?}:"))?;
        writer.write_all(b"\n")?;
    }
    finish_writer(writer, out_filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde::{Deserialize, Serialize};
    use std::io::Read;

    #[derive(Debug, Deserialize, PartialEq, Serialize)]
    struct Record {
        key: String,
        value: u64
    }

    #[test]
    fn test_ndjson_gz() {
        let folder = tempfile::tempdir().unwrap();
        let filename = folder.path().join("records.json.gz");
        let records = vec![
            Record { key: "a".to_string(), value: 1 },
            Record { key: "b".to_string(), value: 2 }
        ];
        save_ndjson(records.iter(), &filename).unwrap();
        let loaded: Vec<Record> = load_ndjson(&filename).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_finish_writes_gzip_trailer() {
        let folder = tempfile::tempdir().unwrap();
        let filename = folder.path().join("out.txt.gz");
        let mut writer = open_writer(&filename).unwrap();
        writer.write_all(b"hello\n").unwrap();
        finish_writer(writer, &filename).unwrap();

        // a single-member decoder fails on a missing trailer
        let mut text = String::new();
        flate2::read::GzDecoder::new(File::open(&filename).unwrap()).read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello\n");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_finish_reports_errors() {
        let device = Path::new("/dev/full");
        if !device.exists() {
            return;
        }
        let folder = tempfile::tempdir().unwrap();
        let filename = folder.path().join("full.json.gz");
        std::os::unix::fs::symlink(device, &filename).unwrap();

        let mut writer = open_writer(&filename).unwrap();
        writer.write_all(b"{}\n").unwrap();
        assert!(finish_writer(writer, &filename).is_err());
    }

    #[test]
    fn test_ndjson_bad_line() {
        let folder = tempfile::tempdir().unwrap();
        let filename = folder.path().join("records.json");
        std::fs::write(&filename, "{\"key\":\"a\",\"value\":1}\n\nnot json\n").unwrap();
        let result: anyhow::Result<Vec<Record>> = load_ndjson(&filename);
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("line 3"));
    }
}
