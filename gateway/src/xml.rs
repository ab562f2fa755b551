//! Textual response bodies: upload/download-info/stat XML and the cache
//! endpoint's JSON assembly.

use std::fmt::Write;

const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>";

/// Fixed placeholder: no real region lookup is performed.
const REGION: &str = "-1";

pub fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// One `<complete/>` element of the upload response.
pub struct CompleteEntry {
    pub addr: String,
    pub path: String,
    pub group: u32,
    pub status: i32,
}

pub fn render_upload_post(
    obj: &str,
    id: &str,
    groups: usize,
    size: usize,
    min_group: u32,
    entries: &[CompleteEntry],
) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "{XML_DECL}\n<post obj=\"{obj}\" id=\"{id}\" groups=\"{groups}\" \
         size=\"{size}\" key=\"/{min_group}/{obj}\">\n",
        obj = escape_xml(obj),
    );

    let mut written = 0;
    for entry in entries {
        if entry.status == 0 {
            written += 1;
        }
        let _ = write!(
            out,
            "<complete addr=\"{}\" path=\"{}\" group=\"{}\" status=\"{}\"/>\n",
            escape_xml(&entry.addr),
            escape_xml(&entry.path),
            entry.group,
            entry.status,
        );
    }

    let _ = write!(out, "<written>{written}</written>\n</post>");
    out
}

pub fn render_download_info(host: &str, path: &str) -> String {
    format!(
        "{XML_DECL}<download-info><host>{}</host><path>{}</path>\
         <region>{REGION}</region></download-info>",
        escape_xml(host),
        escape_xml(path),
    )
}

/// One node of the stat-log response, fields as delivered by the cluster
/// status query.
pub struct StatNode {
    pub addr: String,
    pub id: String,
    /// Load averages as integer centipercent.
    pub la: [u32; 3],
    pub vm_total: u64,
    pub vm_free: u64,
    pub vm_cached: u64,
    pub frsize: u64,
    pub bsize: u64,
    pub blocks: u64,
    pub bavail: u64,
    pub files: u64,
    pub fsid: u64,
}

pub fn render_stat_log(nodes: &[StatNode]) -> String {
    let mut out = format!("{XML_DECL}<data>\n");

    for node in nodes {
        let _ = write!(
            out,
            "<stat addr=\"{}\" id=\"{}\">",
            escape_xml(&node.addr),
            escape_xml(&node.id),
        );
        out.push_str("<la>");
        for (i, la) in node.la.iter().enumerate() {
            if i != 0 {
                out.push(' ');
            }
            let _ = write!(out, "{:.2}", *la as f32 / 100.0);
        }
        out.push_str("</la>");
        let _ = write!(
            out,
            "<memtotal>{}</memtotal><memfree>{}</memfree><memcached>{}</memcached>\
             <storage_size>{}</storage_size><available_size>{}</available_size>\
             <files>{}</files><fsid>{:x}</fsid></stat>",
            node.vm_total,
            node.vm_free,
            node.vm_cached,
            node.frsize * node.blocks / 1024 / 1024,
            node.bavail * node.bsize / 1024 / 1024,
            node.files,
            node.fsid,
        );
    }

    out.push_str("</data>");
    out
}

/// Assemble the cache introspection body from pre-rendered JSON
/// fragments, in the order given.
pub fn render_cache(fields: &[(&str, String)]) -> String {
    let mut out = String::from("{\n");
    for (i, (name, fragment)) in fields.iter().enumerate() {
        if i != 0 {
            out.push_str(",\n");
        }
        let _ = write!(out, "\"{name}\" : {fragment}");
    }
    if !fields.is_empty() {
        out.push('\n');
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(escape_xml("a<b>&\"'"), "a&lt;b&gt;&amp;&quot;&apos;");
    }

    #[test]
    fn upload_post_counts_written_groups() {
        let entries = vec![
            CompleteEntry {
                addr: "127.0.0.1:1025".into(),
                path: "/srv/1/data-0.0".into(),
                group: 1,
                status: 0,
            },
            CompleteEntry {
                addr: String::new(),
                path: String::new(),
                group: 2,
                status: -5,
            },
            CompleteEntry {
                addr: "127.0.0.1:1027".into(),
                path: "/srv/3/data-0.0".into(),
                group: 3,
                status: 0,
            },
        ];
        let body = render_upload_post("pic.jpg", "ab12", 3, 64, 1, &entries);

        assert!(body.starts_with(XML_DECL));
        assert!(body.contains("<post obj=\"pic.jpg\" id=\"ab12\" groups=\"3\" size=\"64\" key=\"/1/pic.jpg\">"));
        assert_eq!(body.matches("<complete ").count(), 3);
        assert!(body.contains("group=\"2\" status=\"-5\""));
        assert!(body.contains("<written>2</written>"));
        assert!(body.ends_with("</post>"));
    }

    #[test]
    fn download_info_has_fixed_region() {
        let body = render_download_info("node1.example.com", "/srv/1/data-0.0:0:42");
        assert!(body.contains("<host>node1.example.com</host>"));
        assert!(body.contains("<path>/srv/1/data-0.0:0:42</path>"));
        assert!(body.contains("<region>-1</region>"));
    }

    #[test]
    fn stat_log_renders_la_and_sizes() {
        let node = StatNode {
            addr: "127.0.0.1:1025".into(),
            id: "00ff".into(),
            la: [89, 150, 23],
            vm_total: 100,
            vm_free: 50,
            vm_cached: 25,
            frsize: 4096,
            bsize: 4096,
            blocks: 1024 * 1024,
            bavail: 512 * 1024,
            files: 7,
            fsid: 0xdeadbeef,
        };
        let body = render_stat_log(&[node]);

        assert!(body.contains("<la>0.89 1.50 0.23</la>"));
        // 4096 * 1048576 / 1024 / 1024 = 4096 MiB
        assert!(body.contains("<storage_size>4096</storage_size>"));
        assert!(body.contains("<available_size>2048</available_size>"));
        assert!(body.contains("<fsid>deadbeef</fsid>"));
        assert!(body.contains("<files>7</files>"));
    }

    #[test]
    fn cache_body_joins_fields_in_given_order() {
        let body = render_cache(&[
            ("group-weights", "{\"default\":[]}".to_string()),
            ("bad-groups", "[]".to_string()),
        ]);
        assert_eq!(
            body,
            "{\n\"group-weights\" : {\"default\":[]},\n\"bad-groups\" : []\n}\n"
        );
    }

    #[test]
    fn cache_body_empty_when_no_fields() {
        assert_eq!(render_cache(&[]), "{\n}\n");
    }
}
