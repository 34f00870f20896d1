use minder_downloader::export::consolidate;
use minder_downloader::fetcher::CsvTableParser;
use minder_downloader::table::{Cell, Table, SOURCE_COLUMN};

fn parsed(source: &str, csv: &str) -> Table {
    let mut table = CsvTableParser::parse(csv).unwrap();
    table.tag_source(source);
    table
}

#[test]
fn consolidates_files_in_order_with_union_schema() {
    let sleep = parsed("raw_sleep_mat", "id,start_date,state\n1,2023-06-01,AWAKE\n");
    let pir = parsed(
        "raw_activity_pir",
        "id,start_date,location_name\n2,2023-06-01,kitchen\n3,2023-06-02,hall\n",
    );

    let (table, stats) = consolidate(vec![sleep, pir]);

    assert_eq!(
        table.columns(),
        &["id", "start_date", "state", SOURCE_COLUMN, "location_name"]
    );
    assert_eq!(stats.files, 2);
    assert_eq!(stats.rows, 3);
    assert_eq!(table.cell(0, "location_name"), Some(&Cell::Null));
    assert_eq!(table.cell(2, "id"), Some(&Cell::from("3")));
    assert_eq!(table.cell(2, SOURCE_COLUMN), Some(&Cell::from("raw_activity_pir")));
}

#[test]
fn echoed_header_rows_are_dropped_and_rows_renumbered() {
    let first = parsed("raw_door", "id,value\n1,open\nid,value\n2,closed\n");
    let second = parsed("raw_door", "id,value\nid,value\n");

    let (table, stats) = consolidate(vec![first, second]);

    assert_eq!(stats.header_rows_removed, 2);
    assert_eq!(table.len(), 2);
    assert_eq!(table.cell(1, "value"), Some(&Cell::from("closed")));
}

#[test]
fn boolean_text_becomes_bool_exactly() {
    let table = parsed("raw_flags", "id,flag\n1,true\n2,false\n3,True\n4,\n");

    let (table, stats) = consolidate(vec![table]);

    assert_eq!(stats.booleans_normalized, 2);
    let flags = table.column("flag").unwrap();
    assert_eq!(flags[0], &Cell::Bool(true));
    assert_eq!(flags[1], &Cell::Bool(false));
    assert_eq!(flags[2], &Cell::from("True"));
    assert_eq!(flags[3], &Cell::Null);
}

#[test]
fn nothing_to_consolidate_is_an_empty_table() {
    let (table, stats) = consolidate(Vec::new());
    assert!(table.is_empty());
    assert_eq!(table.width(), 0);
    assert_eq!(stats.rows, 0);
}
