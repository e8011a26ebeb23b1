use pretty_assertions::assert_eq;
use sicide_core::wire::{AssemblerError, LinkerError};
use sicide_core::{
    ErrorLocation, ErrorOrigin, LoadOutcome, LoadReport, LoadedFile, ListingRow, MemoryWindow,
    RegisterSnapshot, Session, StepVerdict, WatchVariable,
};

fn row(address: &str, raw: &str) -> ListingRow {
    ListingRow {
        address_hex: address.into(),
        raw_code_hex: raw.into(),
        ..ListingRow::default()
    }
}

fn watch(name: &str, address: u32) -> WatchVariable {
    WatchVariable {
        name: name.into(),
        address,
        data_type: "WORD".into(),
        element_size: Some(3),
        element_count: Some(1),
    }
}

fn file(name: &str, rows: Vec<ListingRow>, watches: Vec<WatchVariable>) -> LoadedFile {
    LoadedFile {
        file_name: name.into(),
        rows,
        watches,
        assembler_errors: vec![],
        linker_error: None,
    }
}

fn regs(pc: u32) -> RegisterSnapshot {
    RegisterSnapshot {
        pc,
        ..RegisterSnapshot::default()
    }
}

fn session() -> Session {
    Session::new(None, MemoryWindow::new(0, 15).unwrap())
}

fn program() -> LoadOutcome {
    LoadOutcome::Loaded {
        registers: regs(0x1000),
        files: vec![file(
            "main.asm",
            vec![
                row("1000", "172027"),
                row("1003", "032024"),
                row("1006", ""),
                row("1006", "0F2021"),
            ],
            vec![watch("ALPHA", 0x1030)],
        )],
    }
}

#[test]
fn second_load_replaces_first() {
    let mut s = session();
    s.apply_load(program());
    s.watches.store(0x1030, vec![0, 0, 1]);

    s.apply_load(LoadOutcome::Loaded {
        registers: regs(0x2000),
        files: vec![
            file("a.asm", vec![row("2000", "01")], vec![watch("X", 0x2010)]),
            file("b.asm", vec![row("3000", "02")], vec![watch("Y", 0x3010)]),
        ],
    });

    let files: Vec<_> = s.listings.listings().iter().map(|l| l.file.as_str()).collect();
    assert_eq!(files, vec!["a.asm", "b.asm"]);
    let names: Vec<_> = s.watches.entries().iter().map(|w| w.variable.name.as_str()).collect();
    assert_eq!(names, vec!["X", "Y"]);
    assert_eq!(s.watches.value_at(0x1030), None);
    assert_eq!(s.registers.pc(), Some(0x2000));
}

#[test]
fn failed_load_leaves_previous_session_untouched() {
    let mut s = session();
    s.apply_load(program());

    let mut broken = file("main.asm", vec![], vec![]);
    broken.assembler_errors.push(AssemblerError {
        row: 4,
        col: 9,
        length: Some(3),
        message: "undefined symbol".into(),
        nonbreaking: false,
    });
    let report = s.apply_load(LoadOutcome::Failed {
        files: vec![broken],
    });

    assert_eq!(
        report,
        LoadReport::Failed {
            reveal: Some(ErrorLocation {
                file: "main.asm".into(),
                row: 4,
                col: 9
            })
        }
    );
    assert_eq!(s.listings.listings()[0].rows.len(), 4);
    assert_eq!(s.watches.entries().len(), 1);
    assert_eq!(s.registers.pc(), Some(0x1000));
    assert_eq!(s.errors.errors("main.asm")[0].origin, ErrorOrigin::Load);
}

#[test]
fn reveal_picks_first_file_with_assembler_errors() {
    let mut s = session();
    let mut linked = file("a.asm", vec![], vec![]);
    linked.linker_error = Some(LinkerError {
        phase: "linker".into(),
        msg: "duplicate EXTDEF".into(),
    });
    let mut first = file("b.asm", vec![], vec![]);
    for (r, c) in [(7, 2), (1, 1)] {
        first.assembler_errors.push(AssemblerError {
            row: r,
            col: c,
            length: None,
            message: "bad".into(),
            nonbreaking: false,
        });
    }
    let mut second = file("c.asm", vec![], vec![]);
    second.assembler_errors = first.assembler_errors.clone();

    let report = s.apply_load(LoadOutcome::Failed {
        files: vec![linked, first, second],
    });
    assert_eq!(
        report,
        LoadReport::Failed {
            reveal: Some(ErrorLocation {
                file: "b.asm".into(),
                row: 7,
                col: 2
            })
        }
    );
    assert_eq!(s.errors.all().len(), 3);
    assert_eq!(s.errors.errors("a.asm")[0].message, "linker: duplicate EXTDEF");
}

#[test]
fn successful_load_clears_stale_load_errors_only() {
    let mut s = session();
    let mut broken = file("main.asm", vec![], vec![]);
    broken.linker_error = Some(LinkerError {
        phase: "linker".into(),
        msg: "oops".into(),
    });
    s.apply_load(LoadOutcome::Failed {
        files: vec![broken],
    });
    s.errors.add_errors(
        "other.asm",
        vec![sicide_core::CompileError {
            row: 1,
            col: 1,
            length: None,
            message: "typo".into(),
            origin: ErrorOrigin::Syntax,
        }],
    );

    assert_eq!(s.apply_load(program()), LoadReport::Loaded);
    assert!(s.errors.errors("main.asm").is_empty());
    assert_eq!(s.errors.errors("other.asm").len(), 1);
}

#[test]
fn unchanged_pc_means_finished() {
    let mut s = session();
    s.apply_load(program());
    let report = s.apply_step(regs(0x1000));
    assert_eq!(report.verdict, StepVerdict::Finished);
}

#[test]
fn breakpoint_on_instruction_row_pauses() {
    let mut s = session();
    s.apply_load(program());
    s.listings.toggle_breakpoint("main.asm", 3);

    assert_eq!(s.apply_step(regs(0x1003)).verdict, StepVerdict::Continue);
    assert_eq!(
        s.apply_step(regs(0x1006)).verdict,
        StepVerdict::BreakpointHit {
            file: "main.asm".into(),
            row: 3
        }
    );
}

#[test]
fn breakpoint_on_directive_row_never_pauses() {
    let mut s = session();
    s.apply_load(program());
    s.listings.toggle_breakpoint("main.asm", 2);

    assert_eq!(s.apply_step(regs(0x1003)).verdict, StepVerdict::Continue);
    assert_eq!(s.apply_step(regs(0x1006)).verdict, StepVerdict::Continue);
}

#[test]
fn step_focuses_first_matching_listing() {
    let mut s = session();
    s.apply_load(LoadOutcome::Loaded {
        registers: regs(0x0100),
        files: vec![
            file("boot.asm", vec![row("0100", "01")], vec![]),
            file("first.asm", vec![row("2050", "01")], vec![]),
            file("second.asm", vec![row("2050", "02")], vec![]),
        ],
    });
    assert_eq!(s.listings.active_file(), Some("boot.asm"));

    let report = s.apply_step(regs(0x2050));
    assert_eq!(report.focused.as_deref(), Some("first.asm"));

    s.listings.select("second.asm");
    s.apply_step(regs(0x0100));
    assert_eq!(s.listings.active_file(), Some("boot.asm"));
    s.listings.select("second.asm");
    let report = s.apply_step(regs(0x2050));
    assert_eq!(report.focused, None);
    assert_eq!(s.listings.active_file(), Some("second.asm"));
}

#[test]
fn clear_keeps_breakpoints_and_errors() {
    let mut s = session();
    s.apply_load(program());
    s.listings.toggle_breakpoint("main.asm", 1);
    s.set_memory_window(0x1000, 0x100F).unwrap();
    assert!(s.store_memory(0x1000, 0x100F, vec![0; 16]));

    s.clear();
    assert!(!s.is_loaded());
    assert!(s.watches.is_empty());
    assert!(s.registers.snapshot().is_none());
    assert!(s.memory().values.is_empty());
    assert_eq!(s.listings.breakpoints("main.asm"), vec![1]);
}

#[test]
fn stale_memory_reads_are_dropped() {
    let mut s = session();
    s.set_memory_window(0x10, 0x1F).unwrap();
    assert!(!s.store_memory(0x0, 0xF, vec![1; 16]));
    assert!(s.set_memory_window(0x20, 0x10).is_err());
}

#[test]
fn failed_load_keeps_syntax_errors_and_reveals_relative_path() {
    let mut s = Session::new(
        Some(std::path::PathBuf::from("/proj")),
        MemoryWindow::new(0, 15).unwrap(),
    );
    s.errors.add_errors(
        "src/main.asm",
        vec![sicide_core::CompileError {
            row: 2,
            col: 1,
            length: None,
            message: "typo".into(),
            origin: ErrorOrigin::Syntax,
        }],
    );

    let mut broken = file("/proj/src/main.asm", vec![], vec![]);
    broken.assembler_errors.push(AssemblerError {
        row: 5,
        col: 3,
        length: None,
        message: "undefined symbol".into(),
        nonbreaking: false,
    });
    let report = s.apply_load(LoadOutcome::Failed {
        files: vec![broken],
    });

    assert_eq!(
        report,
        LoadReport::Failed {
            reveal: Some(ErrorLocation {
                file: "src/main.asm".into(),
                row: 5,
                col: 3
            })
        }
    );
    let origins: Vec<_> = s
        .errors
        .errors("src/main.asm")
        .iter()
        .map(|e| e.origin)
        .collect();
    assert_eq!(origins, vec![ErrorOrigin::Syntax, ErrorOrigin::Load]);
}
