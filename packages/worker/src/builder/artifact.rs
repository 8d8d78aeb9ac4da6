use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::BuildError;
use crate::source::Monster;

pub const HEADER: [&str; 8] = [
    "id",
    "name",
    "description",
    "common_locations",
    "drops",
    "category",
    "image",
    "dlc",
];

fn render_list(items: &[String]) -> String {
    format!("[{}]", items.join(" "))
}

/// Encode rows as CSV, compressing while writing.
pub fn encode_rows(rows: &[Monster]) -> Result<Vec<u8>, BuildError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut writer = csv::Writer::from_writer(encoder);

    writer.write_record(HEADER)?;
    for row in rows {
        writer.write_record([
            row.id.to_string(),
            row.name.clone(),
            row.description.clone(),
            render_list(&row.common_locations),
            render_list(&row.drops),
            row.category.clone(),
            row.image.clone(),
            row.dlc.to_string(),
        ])?;
    }

    let encoder = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn monster(id: i64, name: &str) -> Monster {
        Monster {
            id,
            name: name.into(),
            description: "lives in caves, mostly".into(),
            common_locations: vec!["Hyrule Field".into(), "Gerudo Desert".into()],
            drops: vec![],
            category: "monsters".into(),
            image: format!("https://example.com/{id}.png"),
            dlc: id % 2 == 0,
        }
    }

    fn gunzip(bytes: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(bytes).read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn writes_header_and_rows() {
        let bytes = encode_rows(&[monster(1, "keese"), monster(2, "lizalfos")]).unwrap();
        let text = gunzip(&bytes);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "id,name,description,common_locations,drops,category,image,dlc"
        );
        assert_eq!(
            lines[1],
            "1,keese,\"lives in caves, mostly\",[Hyrule Field Gerudo Desert],[],monsters,https://example.com/1.png,false"
        );
        assert!(lines[2].ends_with(",true"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn output_parses_back_as_csv() {
        let bytes = encode_rows(&[monster(5, "moblin")]).unwrap();
        let text = gunzip(&bytes);
        let mut reader = csv::Reader::from_reader(text.as_bytes());

        assert_eq!(reader.headers().unwrap().iter().collect::<Vec<_>>(), HEADER);
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[2], "lives in caves, mostly");
    }
}
