use domino_connector::models::Record;
use domino_connector::parser::filter_parser::parse_filter;
use domino_connector::parser::formula::parse_formula;
use domino_connector::query::formula_translator::compile;
use domino_connector::query::{scoped_query, CasePolicy};
use domino_connector::{Filter, ObjectClass};

fn person(full_name: &str, last_name: &str, short_name: &str) -> Record {
    let mut record = Record::new(ObjectClass::Account);
    record.id = Some("0123456789ABCDEF0123456789ABCDEF".to_string());
    record.set_text("FullName", full_name);
    record.set_text("LastName", last_name);
    record.set_text("ShortName", short_name);
    record
}

/// Compile a textual filter, scope it and evaluate it against a record
fn selects(filter: &str, record: &Record, policy: &CasePolicy) -> bool {
    let filter = parse_filter(filter).unwrap();
    let query = compile(&filter, ObjectClass::Account, policy).unwrap();
    let formula = parse_formula(&scoped_query(ObjectClass::Account, query.as_deref())).unwrap();
    formula.matches(record)
}

#[test]
fn test_compiled_filters_select_expected_records() {
    let doe = person("CN=John Doe/O=Acme", "Doe", "jdoe");
    let policy = CasePolicy::default();

    let cases = [
        (r#"LastName eq "DOE""#, true),
        (r#"LastName ne "doe""#, false),
        (r#"LastName co "o""#, true),
        (r#"LastName sw "D""#, true),
        (r#"LastName ew "x""#, false),
        (r#"not LastName ew "x""#, true),
        (r#"ShortName eq "JDOE""#, false),
        (r#"ShortName eq "jdoe""#, true),
        (r#"__NAME__ eq "john doe/acme""#, true),
        (r#"LastName eq "Doe" and ShortName eq "other""#, false),
        (r#"LastName eq "Roe" or ShortName eq "jdoe""#, true),
        (r#"not (LastName eq "Roe" or ShortName eq "other")"#, true),
        (r#"LastName gt "C""#, true),
        (r#"not LastName ge "A""#, false),
    ];

    for (filter, expected) in cases {
        assert_eq!(selects(filter, &doe, &policy), expected, "filter: {}", filter);
    }
}

#[test]
fn test_case_sensitive_policy() {
    let doe = person("CN=John Doe/O=Acme", "Doe", "jdoe");
    let policy = CasePolicy::new(false, Vec::new());

    assert!(!selects(r#"LastName eq "DOE""#, &doe, &policy));
    assert!(selects(r#"LastName eq "Doe""#, &doe, &policy));
}

#[test]
fn test_uid_filter_is_direct_lookup() {
    let filter = Filter::equals("__UID__", "<GUID=0123456789ABCDEF0123456789ABCDEF>");
    let query = compile(&filter, ObjectClass::Account, &CasePolicy::default())
        .unwrap()
        .unwrap();
    assert_eq!(query, r#"(NoteID="0123456789ABCDEF0123456789ABCDEF")"#);
    assert_eq!(
        domino_connector::query::direct_record_id(&query),
        Some("0123456789ABCDEF0123456789ABCDEF")
    );
}

#[test]
fn test_quotes_in_values_survive() {
    let record = person(r#"CN=John "JD" Doe/O=Acme"#, r#"Doe\Smith"#, "jdoe");
    assert!(selects(r#"LastName eq "doe\\smith""#, &record, &CasePolicy::default()));
}

#[test]
fn test_embedded_quotes_round_trip() {
    let mut record = person(r#"CN=John "JD" Doe/O=Acme"#, r#"O"Brien"#, "jdoe");
    record.set_text("JobTitle", r#"Head of "Ops""#);
    let policy = CasePolicy::default();

    assert!(selects(r#"LastName eq "o\"brien""#, &record, &policy));
    assert!(!selects(r#"LastName eq "o\"brian""#, &record, &policy));
    assert!(selects(r#"__NAME__ co "\"jd\"""#, &record, &policy));
    assert!(selects(r#"JobTitle ew "\"ops\"""#, &record, &policy));
    assert!(selects(r#"not JobTitle sw "\"""#, &record, &policy));

    let filter = Filter::equals("LastName", r#"O"Brien"#);
    let query = compile(&filter, ObjectClass::Account, &CasePolicy::new(false, Vec::new()))
        .unwrap()
        .unwrap();
    assert_eq!(query, r#"(LastName="O\"Brien")"#);
    assert!(parse_formula(&query).unwrap().matches(&record));
}
