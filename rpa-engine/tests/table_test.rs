use proptest::prelude::*;
use rpa_engine::extract_table;
use serde_json::{json, Value};

fn markup(header: &[String], body: &[Vec<i64>]) -> String {
    let mut html = String::from("<tr>");
    for label in header {
        html.push_str(&format!("<th>{}</th>", label));
    }
    html.push_str("</tr>");
    for row in body {
        html.push_str("<tr>");
        for n in row {
            html.push_str(&format!("<td>{}</td>", n));
        }
        html.push_str("</tr>");
    }
    html
}

proptest! {
    #[test]
    fn numeric_cells_become_numbers(
        width in 1usize..6,
        body in prop::collection::vec(prop::collection::vec(-10_000i64..10_000, 6), 0..8),
    ) {
        let header: Vec<String> = (0..width).map(|i| format!("h{}", i)).collect();
        let body: Vec<Vec<i64>> = body.into_iter().map(|row| row[..width].to_vec()).collect();

        let rows = extract_table(&markup(&header, &body));

        prop_assert_eq!(rows.len(), body.len());
        for (record, expected) in rows.iter().zip(&body) {
            for (key, n) in header.iter().zip(expected) {
                prop_assert_eq!(&record[key.as_str()], &json!(n));
            }
        }
    }
}

#[test]
fn test_body_cells_zip_positionally() {
    let rows = extract_table(
        "<tr><th>City</th><th>Temp</th></tr>\
         <tr><td rowspan=\"2\">Oslo</td><td>-3</td></tr>\
         <tr><td>1</td></tr>",
    );

    // Body spans are not expanded; a short row keeps its leading keys
    assert_eq!(
        rows,
        vec![json!({ "City": "Oslo", "Temp": -3 }), json!({ "City": 1 })]
    );
}

#[test]
fn test_blank_and_duplicate_labels() {
    let rows = extract_table(
        "<tr><th></th><th>Total</th><th>Total</th></tr>\
         <tr><td>a</td><td>1</td><td>2</td></tr>",
    );
    assert_eq!(
        rows,
        vec![json!({ "column1": "a", "Total": 1, "Total_2": 2 })]
    );
}

#[test]
fn test_empty_markup() {
    assert_eq!(extract_table(""), Vec::<Value>::new());
    assert_eq!(extract_table("<tr><th>Only header</th></tr>"), Vec::<Value>::new());
}
