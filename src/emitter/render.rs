//! Text renderers for a canonical parameter map.
//!
//! All three shapes are derived from the same map; `--model` always comes
//! first and the remaining flags follow in key order.

use super::{ParamValue, ParameterMap, MODEL_PLACEHOLDER};
use crate::config::OutputConfig;

const CONTINUATION: &str = " \\\n  ";

/// `--flag value` / bare `--flag` tokens, model first.
pub fn argument_tokens(params: &ParameterMap) -> Vec<String> {
    let mut tokens = Vec::new();
    if let Some(model) = params.get("model").and_then(ParamValue::render) {
        tokens.push("--model".to_string());
        tokens.push(model);
    }
    for (name, value) in params {
        if name == "model" {
            continue;
        }
        match value {
            ParamValue::Bool(true) => tokens.push(format!("--{name}")),
            ParamValue::Bool(false) | ParamValue::Null => {}
            other => {
                if let Some(rendered) = other.render() {
                    tokens.push(format!("--{name}"));
                    tokens.push(rendered);
                }
            }
        }
    }
    tokens
}

/// Quote a token for a POSIX shell when it contains anything unusual.
pub fn shell_quote(token: &str) -> String {
    let safe = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@%+".contains(c));
    if safe {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}

/// Pair each flag with its value on one line for readability.
fn argument_lines(params: &ParameterMap) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for token in argument_tokens(params) {
        let quoted = shell_quote(&token);
        match lines.last_mut() {
            Some(last) if !token.starts_with("--") && last.starts_with("--") && !last.contains(' ') => {
                last.push(' ');
                last.push_str(&quoted);
            }
            _ => lines.push(quoted),
        }
    }
    lines
}

pub fn command_line(output: &OutputConfig, params: &ParameterMap) -> String {
    let mut parts = vec![output.entrypoint.clone()];
    parts.extend(argument_lines(params));
    parts.join(CONTINUATION)
}

pub fn docker_run(output: &OutputConfig, params: &ParameterMap) -> String {
    let port = params
        .get("port")
        .and_then(ParamValue::as_i64)
        .unwrap_or(i64::from(output.port));
    let mut parts = vec![
        "docker run --runtime nvidia --gpus all".to_string(),
        format!("-v {}:/root/.cache/huggingface", output.hf_cache_dir),
        "--env \"HUGGING_FACE_HUB_TOKEN=$HF_TOKEN\"".to_string(),
        format!("-p {port}:{port}"),
        "--ipc=host".to_string(),
        output.docker_image.clone(),
    ];
    parts.extend(argument_lines(params));
    parts.join(CONTINUATION)
}

/// Lower-case DNS-1123 label derived from the model identifier.
pub fn deployment_name(params: &ParameterMap) -> String {
    let model = params
        .get("model")
        .and_then(ParamValue::render)
        .filter(|m| m != MODEL_PLACEHOLDER)
        .unwrap_or_default();
    let base = model.rsplit('/').next().unwrap_or_default();
    let mut slug = String::new();
    for ch in base.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        return "vllm-server".to_string();
    }
    let name = format!("vllm-{slug}");
    name.chars().take(63).collect::<String>().trim_end_matches('-').to_string()
}

fn yaml_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

pub fn kubernetes_deployment(output: &OutputConfig, params: &ParameterMap) -> String {
    let name = deployment_name(params);
    let int = |key: &str| params.get(key).and_then(ParamValue::as_i64).unwrap_or(1).max(1);
    let gpus = int("tensor-parallel-size") * int("pipeline-parallel-size");
    let port = params
        .get("port")
        .and_then(ParamValue::as_i64)
        .unwrap_or(i64::from(output.port));

    let args: String = argument_tokens(params)
        .iter()
        .map(|t| format!("            - {}\n", yaml_string(t)))
        .collect();

    format!(
        "apiVersion: apps/v1
kind: Deployment
metadata:
  name: {name}
  namespace: {namespace}
  labels:
    app: {name}
spec:
  replicas: 1
  selector:
    matchLabels:
      app: {name}
  template:
    metadata:
      labels:
        app: {name}
    spec:
      containers:
        - name: vllm
          image: {image}
          args:
{args}          ports:
            - containerPort: {port}
          env:
            - name: HUGGING_FACE_HUB_TOKEN
              valueFrom:
                secretKeyRef:
                  name: hf-token
                  key: token
          resources:
            limits:
              nvidia.com/gpu: \"{gpus}\"
          volumeMounts:
            - name: shm
              mountPath: /dev/shm
      volumes:
        - name: shm
          emptyDir:
            medium: Memory
",
        namespace = output.namespace,
        image = output.docker_image,
    )
}
