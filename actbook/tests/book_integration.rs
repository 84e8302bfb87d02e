use actbook::{BookSession, CommandLog, RenderCommand, SessionOptions};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn save_image(path: &Path, width: u32, height: u32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    image::RgbImage::new(width, height).save(path).unwrap();
}

/// A two-act book directory with a sidecar, an act image and an inline image
fn book_directory(root: &Path) -> std::path::PathBuf {
    let book = root.join("Die Reise");
    write(
        &book.join("1. Akt/1. Kapitel Anfang.md"),
        "Es war \"kalt\".\n\n![Karte](karte.png)\n",
    );
    write(&book.join("1. Akt/10. Kapitel Ende.md"), "Schluss.\n");
    write(&book.join("1. Akt/2. Kapitel Mitte.md"), "Mitte.\n");
    write(&book.join("2. Akt/1. Kapitel Heimkehr.md"), "Zuhause.\n");
    write(
        &book.join("metadata.json"),
        r#"{"author": "M. Muster", "format": "A5", "acts": [{"number": "1", "title": "Aufbruch"}]}"#,
    );
    save_image(&book.join("1. Akt/Akt1.png"), 200, 100);
    save_image(&book.join("1. Akt/karte.png"), 100, 40);
    book
}

fn markup_blocks(log: &CommandLog) -> Vec<&str> {
    log.commands
        .iter()
        .filter_map(|command| match command {
            RenderCommand::Markup(markup) => Some(markup.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_directory_book_commands() {
    // Arrange
    let scratch = TempDir::new().unwrap();
    let book = book_directory(scratch.path());
    let mut session = BookSession::new(SessionOptions {
        staging_dir: scratch.path().join("output"),
        ..SessionOptions::default()
    });

    // Act
    session.load_directory(&book).unwrap();
    let mut log = CommandLog::new();
    session.assemble_into(&mut log).unwrap();

    // Assert
    assert_eq!(
        log.commands[0],
        RenderCommand::DocumentInfo {
            title: "Die Reise".to_string(),
            author: "M. Muster".to_string(),
        }
    );
    assert_eq!(session.config().format, "A5");
    assert_eq!(
        log.bookmarks(),
        vec![
            ("1. Akt: Aufbruch", 0),
            ("1. Kapitel Anfang", 1),
            ("2. Kapitel Mitte", 1),
            ("10. Kapitel Ende", 1),
            ("2. Akt", 0),
            ("1. Kapitel Heimkehr", 1),
        ]
    );

    let markup = markup_blocks(&log);
    let act_page = markup
        .iter()
        .find(|m| m.contains("Aufbruch"))
        .expect("act page markup");
    assert!(act_page.contains("width: 150pt, height: 75pt"));

    let first_chapter = markup
        .iter()
        .find(|m| m.contains("kalt"))
        .expect("chapter markup");
    assert!(first_chapter.contains("Es war „kalt“."));
    assert!(first_chapter.contains("width: 75pt, height: 30pt, alt: \"Karte\")"));

    assert!(scratch.path().join("output/Akt1.png").is_file());
    assert!(scratch.path().join("output/1. Akt/karte.png").is_file());
}

#[test]
fn test_single_file_and_directory_agree() {
    let scratch = TempDir::new().unwrap();
    let book = scratch.path().join("buch");
    write(&book.join("1. Akt/1. Kapitel.md"), "Eins.\n");
    write(&book.join("2. Akt/1. Kapitel.md"), "Zwei.\n");
    write(
        &scratch.path().join("buch.md"),
        "# buch\n\n## 1. Akt\n### 1. Kapitel\nEins.\n\n## 2. Akt\n### 1. Kapitel\nZwei.\n",
    );

    let options = SessionOptions {
        staging_dir: scratch.path().join("output"),
        ..SessionOptions::default()
    };

    let mut from_directory = BookSession::new(options.clone());
    from_directory.load_directory(&book).unwrap();
    let mut directory_log = CommandLog::new();
    from_directory.assemble_into(&mut directory_log).unwrap();

    let mut from_file = BookSession::new(options);
    from_file.load_file(scratch.path().join("buch.md")).unwrap();
    let mut file_log = CommandLog::new();
    from_file.assemble_into(&mut file_log).unwrap();

    assert_eq!(directory_log.commands, file_log.commands);
}

#[test]
fn test_orphan_chapter_is_rejected() {
    let mut session = BookSession::new(SessionOptions::default());
    let result = session.load_string("# Buch\n### Kapitel ohne Akt\n## 1. Akt\n");

    assert!(matches!(result, Err(actbook::BookError::Structure(_))));
}

#[test]
fn test_generate_pdf() {
    let scratch = TempDir::new().unwrap();
    let output = scratch.path().join("out/buch.pdf");

    let mut session = BookSession::new(SessionOptions {
        staging_dir: scratch.path().join("output"),
        ..SessionOptions::default()
    });
    session
        .load_string(
            "# Die Reise\n**Autor:** M. Muster\n\n## 1. Akt\n### Aufbruch\n\
             Es war *kalt* - sehr \"kalt\".\n\n- eins\n- zwei\n\n## 2. Akt\n### Ende\nFin.\n",
        )
        .unwrap();

    let report = session.generate_report(&output);

    assert!(report.success, "{}", report.message);
    assert_eq!(report.output.as_deref(), Some(output.as_path()));
    let bytes = fs::read(&output).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}
