use crowd_beans::io::*;
use crowd_beans::simulate::{generate_glad_data, GladSimArgs};

use std::io::Write;
use tempfile::tempdir;

fn write_text(path: &std::path::Path, text: &str) -> anyhow::Result<()> {
    let mut f = std::fs::File::create(path)?;
    f.write_all(text.as_bytes())?;
    Ok(())
}

#[test]
fn headered_columns_are_picked_by_name() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let file = dir.path().join("answers.tsv");
    write_text(
        &file,
        "# crowd answers\nworker\tlabel\textra\ttask\nw1\tA\tx\tt1\nw2\tB\ty\tt1\nw1\tB\tz\tt2\n",
    )?;

    let data = read_crowd_labels(file.to_str().unwrap(), Some("\t"), true)?;
    assert_eq!(data.num_observations(), 3);
    assert_eq!(data.num_tasks(), 2);
    assert_eq!(data.tasks().name(0), "t1");
    assert_eq!(data.workers().name(1), "w2");
    assert_eq!(data.labels().name(1), "B");
    Ok(())
}

#[test]
fn missing_column_is_an_error() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let file = dir.path().join("answers.tsv");
    write_text(&file, "task worker answer\nt1 w1 A\n")?;

    let err = read_crowd_labels(file.to_str().unwrap(), None, true)
        .err()
        .expect("should fail without a label column");
    assert!(err.to_string().contains("label"));
    Ok(())
}

#[test]
fn short_rows_are_an_error() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let file = dir.path().join("answers.txt");
    write_text(&file, "t1 w1 A\nt2 w1\n")?;
    assert!(read_crowd_labels(file.to_str().unwrap(), None, false).is_err());
    Ok(())
}

#[test]
fn empty_table_is_an_error() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let file = dir.path().join("answers.tsv");
    write_text(&file, "task\tworker\tlabel\n")?;
    assert!(read_crowd_labels(file.to_str().unwrap(), Some("\t"), true).is_err());
    Ok(())
}

#[test]
fn gzip_round_trip() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let file = dir.path().join("sim.tsv.gz");
    let file = file.to_str().unwrap();

    let sim = generate_glad_data(&GladSimArgs {
        tasks: 20,
        workers: 5,
        labels: 3,
        answers_per_task: 3,
        ..Default::default()
    })?;
    write_crowd_labels(&sim.data, file)?;

    let data = read_crowd_labels(file, Some("\t"), true)?;
    let expected: Vec<_> = sim.data.triplet_names().collect();
    let observed: Vec<_> = data.triplet_names().collect();
    assert_eq!(expected, observed);
    Ok(())
}

#[test]
fn name_values_skip_header() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let file = dir.path().join("priors.tsv");
    let file = file.to_str().unwrap();

    write_name_values(vec![("A", 0.25), ("B", 0.75)], ("label", "prior"), file)?;
    let pairs = read_name_values(file)?;

    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].0.as_ref(), "A");
    assert!((pairs[1].1 - 0.75).abs() < 1e-12);
    Ok(())
}
