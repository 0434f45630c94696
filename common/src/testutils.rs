use anyhow::{Context, Result};
use async_recursion::async_recursion;

pub async fn setup_test_dir() -> Result<tempfile::TempDir> {
    let tmp_dir = tempfile::tempdir()?;
    // foo
    // |- 0.txt
    // |- bar
    //    |- 1.txt
    //    |- 2.txt
    //    |- 3.txt
    // |- baz
    //    |- 4.txt
    //    |- 5.txt -> ../bar/2.txt
    //    |- 6.txt -> (absolute path) .../foo/bar/3.txt
    let foo_path = tmp_dir.path().join("foo");
    tokio::fs::create_dir(&foo_path).await?;
    tokio::fs::write(foo_path.join("0.txt"), "0").await?;
    let bar_path = foo_path.join("bar");
    tokio::fs::create_dir(&bar_path).await?;
    tokio::fs::write(bar_path.join("1.txt"), "1").await?;
    tokio::fs::write(bar_path.join("2.txt"), "2").await?;
    tokio::fs::write(bar_path.join("3.txt"), "3").await?;
    let baz_path = foo_path.join("baz");
    tokio::fs::create_dir(&baz_path).await?;
    tokio::fs::write(baz_path.join("4.txt"), "4").await?;
    tokio::fs::symlink("../bar/2.txt", baz_path.join("5.txt")).await?;
    tokio::fs::symlink(bar_path.join("3.txt"), baz_path.join("6.txt")).await?;
    Ok(tmp_dir)
}

#[async_recursion]
pub async fn check_dirs_identical(src: &std::path::Path, dst: &std::path::Path) -> Result<()> {
    let mut src_entries = tokio::fs::read_dir(src).await?;
    while let Some(src_entry) = src_entries.next_entry().await? {
        let src_entry_path = src_entry.path();
        let src_entry_name = src_entry_path.file_name().unwrap();
        let dst_entry_path = dst.join(src_entry_name);
        let src_md = tokio::fs::symlink_metadata(&src_entry_path)
            .await
            .context(format!("source file {:?} is missing", &src_entry_path))?;
        let dst_md = tokio::fs::symlink_metadata(&dst_entry_path)
            .await
            .context(format!("destination file {:?} is missing", &dst_entry_path))?;
        assert_eq!(src_md.file_type(), dst_md.file_type());
        assert_eq!(src_md.permissions(), dst_md.permissions());
        if src_md.is_file() {
            let src_contents = tokio::fs::read_to_string(&src_entry_path).await?;
            let dst_contents = tokio::fs::read_to_string(&dst_entry_path).await?;
            assert_eq!(src_contents, dst_contents);
        } else if src_md.file_type().is_symlink() {
            let src_link = tokio::fs::read_link(&src_entry_path).await?;
            let dst_link = tokio::fs::read_link(&dst_entry_path).await?;
            assert_eq!(src_link, dst_link);
        } else {
            check_dirs_identical(&src_entry_path, &dst_entry_path).await?;
        }
    }
    Ok(())
}
