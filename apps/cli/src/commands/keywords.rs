//! keywords 命令：按匹配顺序列出关键字表

use stacker_auto::{KEYWORDS, Keyword, ParamKind};

fn describe(keyword: Keyword) -> String {
    let params: Vec<String> = keyword
        .params()
        .iter()
        .map(|p| match p.kind {
            ParamKind::Float => p.name.to_string(),
            ParamKind::Int => format!("{}:int", p.name),
        })
        .collect();

    let mut flags = Vec::new();
    if keyword.waits_for_response() {
        flags.push("waits");
    }
    if keyword.is_retired() {
        flags.push("retired");
    }

    format!(
        "{:<18} {:<28} {}",
        keyword.text(),
        params.join(" "),
        flags.join(",")
    )
}

pub fn print_keywords() {
    for keyword in KEYWORDS {
        println!("{}", describe(*keyword).trim_end());
    }
}
