use std::fs;
use std::path::PathBuf;

use large_text_sort::sort::Sort;

mod common;

#[test]
fn test_check_sorted() -> Result<(), anyhow::Error> {
    common::setup();
    let input_path = common::temp_file_name(common::results_dir());
    common::write_lines(&input_path, &["1. alpha", "2. alpha", "1. beta"])?;

    let sort = Sort::new(input_path.clone(), PathBuf::new());
    assert!(sort.check()?);
    fs::remove_file(input_path)?;
    Ok(())
}

#[test]
fn test_check_not_sorted() -> Result<(), anyhow::Error> {
    common::setup();
    let input_path = common::temp_file_name(common::results_dir());
    common::write_lines(&input_path, &["2. beta", "1. alpha"])?;

    let sort = Sort::new(input_path.clone(), PathBuf::new());
    assert!(!sort.check()?);
    fs::remove_file(input_path)?;
    Ok(())
}

#[test]
fn test_check_tie_break_order() -> Result<(), anyhow::Error> {
    common::setup();
    let ascending = common::temp_file_name(common::results_dir());
    common::write_lines(&ascending, &["2. same", "10. same"])?;
    assert!(Sort::new(ascending.clone(), PathBuf::new()).check()?);

    let descending = common::temp_file_name(common::results_dir());
    common::write_lines(&descending, &["10. same", "2. same"])?;
    assert!(!Sort::new(descending.clone(), PathBuf::new()).check()?);

    fs::remove_file(ascending)?;
    fs::remove_file(descending)?;
    Ok(())
}

#[test]
fn test_check_empty_file() -> Result<(), anyhow::Error> {
    common::setup();
    let input_path = common::temp_file_name(common::results_dir());
    fs::write(&input_path, "")?;

    let sort = Sort::new(input_path.clone(), PathBuf::new());
    assert!(sort.check()?);
    fs::remove_file(input_path)?;
    Ok(())
}
