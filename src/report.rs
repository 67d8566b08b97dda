//! Plain-text training reports, one file per city.

use std::fmt::Write;

use crate::label::CityDataset;
use crate::records::{FEATURE_NAMES, TARGET_NAME};
use crate::training::{FeatureImportance, TrainedModelArtifact};

const RULE: &str = "========================================================";
const DIVIDER: &str = "--------------------------------------------------------";
const METRICS_NOTE: &str = r"A avaliação do desempenho dos modelos foi realizada por meio das métricas: \textit{acurácia}, \textit{precisão}, \textit{revocação (recall)}, \textit{F1-score} e \textit{matriz de confusão}.";

/// Which report a city receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Trained,
    SingleClass,
    SplitDegenerate,
    FitFailure,
    DataError,
}

impl ReportKind {
    fn suffix(&self) -> &'static str {
        match self {
            ReportKind::Trained => "",
            ReportKind::SingleClass => "_ERRO_CLASSE_UNICA",
            ReportKind::SplitDegenerate => "_ERRO_SPLIT",
            ReportKind::FitFailure => "_ERRO_TREINO",
            ReportKind::DataError => "_ERRO_DADOS",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ReportKind::Trained => "RELATÓRIO DE TREINAMENTO RANDOM FOREST (EVENTOS REAIS)",
            ReportKind::SingleClass => "RELATÓRIO DE TREINAMENTO RANDOM FOREST (CLASSE ÚNICA)",
            ReportKind::SplitDegenerate => "RELATÓRIO DE TREINAMENTO RANDOM FOREST (ERRO NO SPLIT)",
            ReportKind::FitFailure => "RELATÓRIO DE TREINAMENTO RANDOM FOREST (ERRO NO TREINO)",
            ReportKind::DataError => "RELATÓRIO DE TREINAMENTO RANDOM FOREST (ERRO NOS DADOS)",
        }
    }
}

/// `relatorio_{city}_random_forest{suffix}.txt`
pub fn report_file_name(safe_city: &str, kind: ReportKind) -> String {
    format!("relatorio_{safe_city}_random_forest{}.txt", kind.suffix())
}

fn class_name(label: u8) -> &'static str {
    if label == 1 { "Com Interrupção" } else { "Sem Interrupção" }
}

/// `['a', 'b']`
fn feature_list() -> String {
    let quoted: Vec<String> = FEATURE_NAMES.iter().map(|f| format!("'{f}'")).collect();
    format!("[{}]", quoted.join(", "))
}

fn header(out: &mut String, kind: ReportKind, city: &str) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "  {}", kind.title());
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "{METRICS_NOTE}");
    let _ = writeln!(out, "{DIVIDER}");
    let _ = writeln!(out, "Modelo treinado para a cidade: {city}");
    let _ = writeln!(out, "Features utilizadas: {}", feature_list());
    let _ = writeln!(out, "Target Column (Alvo): {TARGET_NAME}");
}

/// `20` for 0.2, `12.5` for 0.125.
fn percent_label(fraction: f64) -> String {
    let pct = fraction * 100.0;
    if (pct - pct.round()).abs() < 1e-9 {
        format!("{}", pct.round() as i64)
    } else {
        format!("{pct:.1}")
    }
}

/// Name column left-aligned, value with six decimals.
pub fn render_importances(importances: &[FeatureImportance]) -> String {
    let width = importances
        .iter()
        .map(|i| i.feature.chars().count())
        .max()
        .unwrap_or(0);
    importances
        .iter()
        .map(|i| format!("{:<width$}    {:.6}", i.feature, i.importance))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_training_report(dataset: &CityDataset, artifact: &TrainedModelArtifact) -> String {
    let eval = &artifact.evaluation;
    let mut out = String::new();
    header(&mut out, ReportKind::Trained, &dataset.city);

    let _ = writeln!(
        out,
        "Proporção Positiva (Interrupções Reais no dataset total): {:.2}%",
        dataset.positive_pct()
    );
    let _ = writeln!(
        out,
        "(Baseado em {} eventos positivos em {} amostras)",
        dataset.positives(),
        dataset.len()
    );
    if !artifact.stratified {
        let _ = writeln!(out, "AVISO: divisão treino/teste sem estratificação.");
    }
    let _ = writeln!(out, "{DIVIDER}");
    let _ = writeln!(
        out,
        "Melhores Hiperparâmetros (GridSearch CV={} Folds):",
        artifact.cv_folds
    );
    let _ = writeln!(out, "{}", artifact.best_params);
    let _ = writeln!(out);
    let _ = writeln!(out, "Melhor F1 na Validação Cruzada (CV): {:.4}", artifact.cv_f1);
    let _ = writeln!(out, "{DIVIDER}");
    let _ = writeln!(
        out,
        "Tamanho do conjunto de treino: {} (Positivos: {})",
        artifact.train_size, artifact.train_positives
    );
    let _ = writeln!(
        out,
        "Tamanho do conjunto de teste: {} (Positivos: {})",
        artifact.test_size, artifact.test_positives
    );
    let _ = writeln!(out, "{DIVIDER}");
    let _ = writeln!(
        out,
        "Métricas no Conjunto de Teste ({}%):",
        percent_label(artifact.test_fraction)
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Acurácia: {:.4}", eval.accuracy);
    let _ = writeln!(out, "AUC: {:.4}", eval.auc);
    let _ = writeln!(out, "F1-Score (Classe 1): {:.4}", eval.f1);
    let _ = writeln!(out, "{DIVIDER}");
    let _ = writeln!(out, "Matriz de Confusão (Teste):");
    let _ = writeln!(out, "  [Verdadeiro Negativo (TN)   Falso Positivo (FP)]");
    let _ = writeln!(out, "  [Falso Negativo (FN)      Verdadeiro Positivo (TP)]");
    let _ = writeln!(out, "{}", eval.confusion.render());
    let _ = writeln!(out);
    let _ = writeln!(out, "Relatório de Classificação (Teste):");
    let _ = writeln!(out, "{}", eval.report.render());
    let _ = writeln!(out, "{DIVIDER}");
    let _ = writeln!(out, "Importância das Features (Baseada em Gini):");
    let _ = writeln!(out, "{}", render_importances(&eval.importances));
    let _ = writeln!(out, "{RULE}");
    out
}

pub fn render_single_class_report(city: &str, samples: usize, positives: usize, label: u8) -> String {
    let mut out = String::new();
    header(&mut out, ReportKind::SingleClass, city);
    let _ = writeln!(out);
    let _ = writeln!(out, "ERRO: Treinamento abortado.");
    let _ = writeln!(
        out,
        "O dataset SÓ contém a classe {label} ({}).",
        class_name(label)
    );
    let _ = writeln!(out, "Total de amostras: {samples}");
    let _ = writeln!(out, "Total de eventos de interrupção real: {positives}");
    let _ = writeln!(out, "{RULE}");
    out
}

/// Report for the remaining abort paths; `dataset` is absent when loading
/// never produced one.
pub fn render_abort_report(
    city: &str,
    kind: ReportKind,
    reason: &str,
    dataset: Option<&CityDataset>,
) -> String {
    let mut out = String::new();
    header(&mut out, kind, city);
    let _ = writeln!(out);
    let _ = writeln!(out, "ERRO: Treinamento abortado.");
    let _ = writeln!(out, "Motivo: {reason}");
    if let Some(d) = dataset {
        let _ = writeln!(out, "Total de amostras: {}", d.len());
        let _ = writeln!(out, "Total de eventos de interrupção real: {}", d.positives());
    }
    let _ = writeln!(out, "{RULE}");
    out
}
