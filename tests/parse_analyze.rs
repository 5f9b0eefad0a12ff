use pbgraph::analyzer::analyze;
use pbgraph::extractor::{self, ExtractionRequest, ExtractorKind};
use pbgraph::model::{ObjectType, RelationType, RwType};
use pbgraph::parser::parse_manifest;
use std::path::{Path, PathBuf};

fn extract_fixture(files: &[(&str, &str)]) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("src");
    for (rel_path, body) in files {
        let path = input_dir.join(rel_path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
    }

    let request = ExtractionRequest::new(input_dir, dir.path().join("out"));
    let result = extractor::extract(ExtractorKind::Auto, &request).unwrap();
    let manifest_path = result.manifest_path;
    (dir, manifest_path)
}

#[test]
fn events_functions_and_relations_flow_end_to_end() {
    let (_dir, manifest_path) = extract_fixture(&[
        (
            "app/w_main.srw",
            concat!(
                "event clicked\n",
                "open(w_detail)\n",
                "wf_total(1)\n",
                "dw_orders.Retrieve()\n",
                "trigger event clicked\n",
            ),
        ),
        (
            "app/w_detail.srw",
            "event open\npublic function integer wf_total (long al_row)\n",
        ),
        (
            "app/dw_orders.srd",
            "release 12;\nretrieve=\"SELECT id FROM tb_order\"\nupdate=\"tb_order\"\ntable(column=(type=long))\n",
        ),
    ]);

    let parse_result = parse_manifest(&manifest_path).unwrap();
    assert!(parse_result.issues.is_empty());
    assert_eq!(parse_result.objects.len(), 3);

    let dw = parse_result
        .objects
        .iter()
        .find(|object| object.object_type == ObjectType::DataWindow)
        .unwrap();
    assert_eq!(dw.data_windows.len(), 1);
    assert_eq!(dw.data_windows[0].base_table.as_deref(), Some("tb_order"));

    let analysis = analyze(&parse_result, None);

    let has = |src: &str, dst: &str, rel: RelationType| {
        analysis.relations.iter().any(|item| {
            item.src_name == src && item.dst_name == dst && item.relation_type == rel
        })
    };
    assert!(has("w_main", "w_detail", RelationType::Opens));
    assert!(has("w_main", "w_detail", RelationType::Calls));
    assert!(has("w_main", "dw_orders", RelationType::UsesDw));
    assert!(has("w_main", "w_main", RelationType::TriggersEvent));

    // Script refs point into extracted files, line-addressed.
    let clicked = analysis
        .events
        .iter()
        .find(|event| event.object_name == "w_main")
        .unwrap();
    assert_eq!(clicked.event_name, "clicked");
    let (ref_path, ref_line) = clicked.script_ref.rsplit_once(':').unwrap();
    assert!(Path::new(ref_path).is_file());
    assert_eq!(ref_line, "1");
}

#[test]
fn syntax_markers_fail_soft_and_keep_other_objects() {
    let (_dir, manifest_path) = extract_fixture(&[
        ("w_ok.srw", "event clicked\n"),
        ("w_bad.srw", "event open\nsome syntax_error here\n"),
    ]);

    let parse_result = parse_manifest(&manifest_path).unwrap();
    assert_eq!(parse_result.objects.len(), 2);
    assert_eq!(parse_result.issues.len(), 1);
    assert_eq!(parse_result.issues[0].object_name, "w_bad");
    assert_eq!(parse_result.issues[0].line_no, Some(2));

    // The broken object still contributes what did parse.
    let bad = parse_result
        .objects
        .iter()
        .find(|object| object.name == "w_bad")
        .unwrap();
    assert_eq!(bad.events.len(), 1);

    let analysis = analyze(&parse_result, None);
    assert_eq!(
        analysis.warnings,
        vec!["parse issue: w_bad (synthetic syntax marker detected)".to_string()]
    );
}

#[test]
fn table_reads_and_writes_survive_the_full_pipeline() {
    let (_dir, manifest_path) = extract_fixture(&[(
        "w_orders.srw",
        concat!(
            "event ue_save\n",
            "select qty from tb_order where id = :ll_id;\n",
            "update tb_order set qty = :ll_qty where id = :ll_id;\n",
        ),
    )]);

    let parse_result = parse_manifest(&manifest_path).unwrap();
    let analysis = analyze(&parse_result, None);

    let table = analysis
        .objects
        .iter()
        .find(|object| object.object_type == ObjectType::Table)
        .unwrap();
    assert_eq!(table.name, "TB_ORDER");
    assert_eq!(table.module, "db");

    let rels: Vec<RelationType> = analysis
        .relations
        .iter()
        .filter(|item| item.dst_name == "TB_ORDER")
        .map(|item| item.relation_type)
        .collect();
    assert!(rels.contains(&RelationType::ReadsTable));
    assert!(rels.contains(&RelationType::WritesTable));

    let usages: Vec<(&str, RwType)> = analysis
        .sql_statements
        .iter()
        .flat_map(|stmt| stmt.table_usages.iter())
        .map(|usage| (usage.table_name.as_str(), usage.rw_type))
        .collect();
    assert!(usages.contains(&("TB_ORDER", RwType::Read)));
    assert!(usages.contains(&("TB_ORDER", RwType::Write)));
}

#[test]
fn binary_fallback_text_feeds_table_impact() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("src");
    std::fs::create_dir_all(&input_dir).unwrap();
    let mut payload = vec![0u8, 1];
    payload.extend_from_slice(b"select * from tb_order;");
    payload.push(0u8);
    std::fs::write(input_dir.join("app.pbl"), &payload).unwrap();

    let request = ExtractionRequest::new(input_dir, dir.path().join("out"));
    let result = extractor::extract(ExtractorKind::Auto, &request).unwrap();

    let parse_result = parse_manifest(&result.manifest_path).unwrap();
    let analysis = analyze(&parse_result, None);

    assert!(analysis.relations.iter().any(|item| {
        item.src_name == "app"
            && item.dst_name == "TB_ORDER"
            && item.relation_type == RelationType::ReadsTable
    }));
}

#[test]
fn missing_extracted_file_becomes_an_issue() {
    let (_dir, manifest_path) = extract_fixture(&[
        ("w_ok.srw", "event clicked\n"),
        ("w_gone.srw", "event open\n"),
    ]);

    // Remove one extracted artifact after the fact.
    let manifest = pbgraph::extractor::load_manifest(&manifest_path).unwrap();
    let victim = manifest
        .objects
        .iter()
        .find(|object| object.name == "w_gone")
        .unwrap();
    std::fs::remove_file(&victim.extracted_path).unwrap();

    let parse_result = parse_manifest(&manifest_path).unwrap();
    assert_eq!(parse_result.objects.len(), 1);
    assert_eq!(parse_result.issues.len(), 1);
    assert!(parse_result.issues[0]
        .message
        .contains("failed to read extracted file"));
}
