use color_eyre::eyre::eyre;
use xforge_domain::PathReport;

pub fn report(input: &str) -> PathReport {
    match xforge_xpath::parse(input) {
        Ok(expr) => PathReport {
            input: input.to_string(),
            valid: true,
            kind: Some(expr.kind().as_str().to_string()),
            normalized: Some(xforge_xpath::normalize(&expr)),
            precedence: Some(xforge_xpath::precedence(&expr).0),
            error: None,
        },
        Err(e) => PathReport {
            input: input.to_string(),
            valid: false,
            kind: None,
            normalized: None,
            precedence: None,
            error: Some(e.to_string()),
        },
    }
}

pub fn run_path(exprs: Vec<String>, format: &str) -> color_eyre::Result<()> {
    let reports: Vec<PathReport> = exprs.iter().map(|e| report(e)).collect();
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for r in &reports {
            match (&r.kind, &r.normalized, r.precedence) {
                (Some(kind), Some(norm), Some(prec)) => crate::ui_out!("{}\t{kind}\t{norm}\t{prec}", r.input),
                _ => crate::ui_err!("{}: {}", r.input, r.error.as_deref().unwrap_or("invalid")),
            }
        }
    }
    let bad = reports.iter().filter(|r| !r.valid).count();
    if bad > 0 {
        return Err(eyre!("{bad} invalid path expression(s)"));
    }
    Ok(())
}
