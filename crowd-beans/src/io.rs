use crate::observations::CrowdLabels;

use flate2::read::GzDecoder;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Required columns of a headered observation table
pub const TASK_COLUMN: &str = "task";
pub const WORKER_COLUMN: &str = "worker";
pub const LABEL_COLUMN: &str = "label";

///
/// Open a file for reading, and return a buffered reader
/// * `input_file` - file name--either gzipped or not
///
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let file = File::open(input_file)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", input_file, e))?;
    match Path::new(input_file).extension().and_then(|x| x.to_str()) {
        Some("gz") => Ok(Box::new(BufReader::new(GzDecoder::new(file)))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

///
/// Open a file for writing, and return a buffered writer
/// * `output_file` - file name--either gzipped or not; `stdout` and
///   `stderr` are accepted too
///
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    if output_file.eq_ignore_ascii_case("stdout") {
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    }

    if output_file.eq_ignore_ascii_case("stderr") {
        return Ok(Box::new(BufWriter::new(std::io::stderr())));
    }

    let file = File::create(output_file)?;
    match Path::new(output_file).extension().and_then(|x| x.to_str()) {
        Some("gz") => {
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            Ok(Box::new(BufWriter::new(encoder)))
        }
        _ => Ok(Box::new(BufWriter::new(file))),
    }
}

///
/// Create the parent directory of `file` if needed
///
pub fn mkdir(file: &str) -> anyhow::Result<()> {
    if let Some(dir) = Path::new(file).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

///
/// Write every line into the output file
///
/// * `lines` - anything displayable, one per line
/// * `output_file` - file name--either gzipped or not
///
pub fn write_lines<T>(lines: &[T], output_file: &str) -> anyhow::Result<()>
where
    T: std::fmt::Display,
{
    let mut buf = open_buf_writer(output_file)?;
    for line in lines {
        if let Err(e) = writeln!(buf, "{}", line) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Ok(());
            }
            return Err(anyhow::anyhow!("unexpected error: {}", e));
        }
    }
    buf.flush()?;
    Ok(())
}

/// Read non-empty, non-comment lines (`#` or `%`) into memory
fn read_content_lines(input_file: &str) -> anyhow::Result<Vec<Box<str>>> {
    let buf = open_buf_reader(input_file)?;
    let mut lines = vec![];
    for line in buf.lines() {
        let line = line?;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() || trimmed.starts_with('#') || trimmed.starts_with('%') {
            continue;
        }
        lines.push(trimmed.into());
    }
    Ok(lines)
}

fn split_fields<'a>(line: &'a str, delim: Option<&str>) -> Vec<&'a str> {
    match delim {
        Some(d) => line.split(d).map(|x| x.trim()).collect(),
        None => line.split_whitespace().collect(),
    }
}

///
/// Read a long-format observation table.
///
/// * `input_file` - file name--either gzipped or not
/// * `delim` - field delimiter (`None` = any whitespace)
/// * `has_header` - if true, the first line names the columns and
///   `task`, `worker`, `label` are picked by name (other columns are
///   ignored); otherwise the first three columns are used in that order
///
pub fn read_crowd_labels(
    input_file: &str,
    delim: Option<&str>,
    has_header: bool,
) -> anyhow::Result<CrowdLabels> {
    let lines = read_content_lines(input_file)?;

    let (columns, body) = if has_header {
        let header = lines
            .first()
            .ok_or_else(|| anyhow::anyhow!("{}: no header line", input_file))?;
        let names = split_fields(header, delim);
        let find = |col: &str| -> anyhow::Result<usize> {
            names
                .iter()
                .position(|x| x.eq_ignore_ascii_case(col))
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "{}: missing required column `{}` in header {:?}",
                        input_file,
                        col,
                        names
                    )
                })
        };
        (
            [find(TASK_COLUMN)?, find(WORKER_COLUMN)?, find(LABEL_COLUMN)?],
            &lines[1..],
        )
    } else {
        ([0, 1, 2], &lines[..])
    };

    let nfields = columns.iter().max().map(|&x| x + 1).unwrap_or(3);

    // order of the rows defines the order of first appearance
    let triplets = body
        .par_iter()
        .enumerate()
        .map(|(i, line)| {
            let fields = split_fields(line, delim);
            if fields.len() < nfields {
                anyhow::bail!(
                    "{}: data line {} has {} field(s), expected at least {}",
                    input_file,
                    i + 1,
                    fields.len(),
                    nfields
                );
            }
            Ok((
                Box::<str>::from(fields[columns[0]]),
                Box::<str>::from(fields[columns[1]]),
                Box::<str>::from(fields[columns[2]]),
            ))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    CrowdLabels::from_triplets(triplets)
}

///
/// Write an observation table with a `task worker label` header
///
pub fn write_crowd_labels(data: &CrowdLabels, output_file: &str) -> anyhow::Result<()> {
    let mut lines: Vec<Box<str>> = Vec::with_capacity(data.num_observations() + 1);
    lines.push(format!("{}\t{}\t{}", TASK_COLUMN, WORKER_COLUMN, LABEL_COLUMN).into());
    lines.extend(
        data.triplet_names()
            .map(|(t, w, l)| format!("{}\t{}\t{}", t, w, l).into_boxed_str()),
    );
    write_lines(&lines, output_file)
}

///
/// Read `name value` pairs, one per line, keeping the file order.
///
/// A first line whose second field is not a number is taken as a
/// header and skipped.
///
pub fn read_name_values(input_file: &str) -> anyhow::Result<Vec<(Box<str>, f64)>> {
    let lines = read_content_lines(input_file)?;
    let mut ret = Vec::with_capacity(lines.len());

    for (i, line) in lines.iter().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            anyhow::bail!(
                "{}: line {} should have a name and a value",
                input_file,
                i + 1
            );
        }
        match fields[1].parse::<f64>() {
            Ok(value) => ret.push((fields[0].into(), value)),
            Err(_) if i == 0 => continue,
            Err(e) => anyhow::bail!("{}: line {}: {}", input_file, i + 1, e),
        }
    }
    Ok(ret)
}

///
/// Write `name value` pairs under a two-column header
///
pub fn write_name_values<N, I>(
    rows: I,
    header: (&str, &str),
    output_file: &str,
) -> anyhow::Result<()>
where
    N: std::fmt::Display,
    I: IntoIterator<Item = (N, f64)>,
{
    let mut lines: Vec<Box<str>> = vec![format!("{}\t{}", header.0, header.1).into()];
    lines.extend(
        rows.into_iter()
            .map(|(name, value)| format!("{}\t{}", name, value).into_boxed_str()),
    );
    write_lines(&lines, output_file)
}
