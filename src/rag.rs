//! Consulta RAG contra Qdrant con filtrado de relevancia y respuesta
//! fundamentada del LLM.
//!
//! Flujo:
//!   1. Embedding de la pregunta.
//!   2. Búsqueda vectorial con sobre-muestreo (2 * top_k candidatos).
//!   3. Filtro por score mínimo y re-evaluación de relevancia semántica
//!      (coseno entre la query y el vector almacenado de cada chunk).
//!   4. Formateo con cita de fuente, o centinela si no queda nada.
//!   5. El LLM responde usando sólo ese contexto; opcionalmente se pide
//!      una autoevaluación de confianza 1-5.

use anyhow::Result;
use tracing::warn;

use crate::config::AppConfig;
use crate::llm::{parse_confidence, ChatMessage, ChatModel, Embedder};
use crate::models::SearchHit;
use crate::vector_store::VectorIndex;

/// Centinela devuelto cuando la base de conocimiento no aporta nada.
pub const NO_CONTEXT_MESSAGE: &str =
    "No tengo información relevante sobre esa consulta en mi base de conocimiento.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

const ANSWER_SYSTEM_PROMPT: &str = "\
Eres un asistente de asesoría académica.
MUY IMPORTANTE: tus respuestas deben basarse ÚNICAMENTE en la información del contexto proporcionado.
- Si el contexto no contiene información suficiente, dilo explícitamente: \"No dispongo de información suficiente para responder con precisión a esta pregunta.\"
- NO inventes ni infieras información que no esté en el contexto.
- Al responder, cita la fuente indicada en cada fragmento.
- Si citas literalmente, usa comillas.
Sé claro, conciso y preciso; es mejor reconocer una limitación que dar información potencialmente incorrecta.";

const CONFIDENCE_SYSTEM_PROMPT: &str =
    "Evalúas objetivamente la confianza de una respuesta en función del contexto disponible.";

/// Parámetros de recuperación (umbral doble + top_k).
#[derive(Debug, Clone, Copy)]
pub struct RetrievalParams {
    pub top_k: usize,
    pub min_score: f32,
    pub relevance_threshold: f32,
}

impl RetrievalParams {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            top_k: cfg.top_k,
            min_score: cfg.min_score,
            relevance_threshold: cfg.relevance_threshold,
        }
    }
}

/// Respuesta final del pipeline RAG. Los campos de confianza sólo se
/// rellenan cuando el modo de autoevaluación está activo.
#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    pub confidence: Option<u8>,
    pub has_relevant_info: Option<bool>,
}

/// Recupera los chunks relevantes para `query`, formateados con cita.
///
/// Devuelve o bien exactamente `[NO_CONTEXT_MESSAGE]`, o bien entre 1 y
/// `top_k` bloques `"[Source: <fuente>]\n<texto>"` ordenados por score.
pub async fn retrieve_similar_docs(
    embedder: &dyn Embedder,
    store: &dyn VectorIndex,
    params: RetrievalParams,
    query: &str,
) -> Result<Vec<String>> {
    let query_texts = [query.to_string()];
    let embeddings = embedder.embed_texts(&query_texts).await?;
    let query_vector = embeddings
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("No se pudo generar el embedding de la query"))?;

    // Sobre-muestreo: se piden más candidatos de los necesarios porque
    // los filtros posteriores pueden descartar parte de ellos.
    let hits = store.search(&query_vector, params.top_k * 2).await?;

    Ok(select_relevant(hits, &query_vector, params))
}

/// Filtra, ordena y formatea los candidatos devueltos por el índice.
pub fn select_relevant(
    hits: Vec<SearchHit>,
    query_vector: &[f32],
    params: RetrievalParams,
) -> Vec<String> {
    let mut relevant: Vec<SearchHit> = hits
        .into_iter()
        .filter(|hit| hit.score > params.min_score)
        .filter(|hit| {
            cosine_similarity(query_vector, &hit.vector) > params.relevance_threshold
        })
        .collect();

    if relevant.is_empty() {
        return vec![NO_CONTEXT_MESSAGE.to_string()];
    }

    relevant.sort_by(|a, b| b.score.total_cmp(&a.score));
    relevant.truncate(params.top_k);

    relevant
        .iter()
        .map(|hit| format!("[Source: {}]\n{}", hit.source, hit.text))
        .collect()
}

/// Similitud coseno entre dos vectores; 0.0 si las dimensiones no
/// coinciden o alguno es nulo.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Compone la respuesta final a partir del contexto recuperado.
///
/// Si el contexto es el centinela no se llama al LLM: se devuelve el
/// propio centinela con confianza 1 (certeza máxima de que no se sabe).
/// Un fallo de la llamada principal al LLM es fatal para la petición;
/// un fallo de la sub-llamada de confianza degrada a 0 sin error.
pub async fn answer_question(
    llm: &dyn ChatModel,
    confidence_enabled: bool,
    question: &str,
    context: &[String],
) -> Result<RagAnswer> {
    if context.len() == 1 && context[0] == NO_CONTEXT_MESSAGE {
        return Ok(RagAnswer {
            answer: NO_CONTEXT_MESSAGE.to_string(),
            confidence: Some(1),
            has_relevant_info: Some(false),
        });
    }

    let joined = context.join(CONTEXT_SEPARATOR);
    let messages = [
        ChatMessage::system(ANSWER_SYSTEM_PROMPT),
        ChatMessage::user(format!("Contexto:\n{joined}\n\nPregunta: {question}")),
    ];
    let answer = llm.complete(&messages).await?;

    if !confidence_enabled {
        return Ok(RagAnswer { answer, confidence: None, has_relevant_info: None });
    }

    let confidence = rate_confidence(llm, &joined, question, &answer).await;
    Ok(RagAnswer {
        answer,
        confidence: Some(confidence),
        has_relevant_info: Some(confidence >= 3),
    })
}

/// Segunda llamada al LLM pidiendo una autoevaluación 1-5 de la
/// respuesta. Cualquier fallo o contenido no interpretable vale 0.
async fn rate_confidence(
    llm: &dyn ChatModel,
    context: &str,
    question: &str,
    answer: &str,
) -> u8 {
    let prompt = format!(
        "Contexto: {context}\n\n\
         Pregunta: {question}\n\n\
         Respuesta que diste: {answer}\n\n\
         En una escala de 1 a 5, valora tu confianza en esta respuesta basándote SÓLO en el contexto proporcionado:\n\
         1: El contexto no contiene información relevante\n\
         2: Hay información relacionada pero no suficientemente específica\n\
         3: Hay información parcial\n\
         4: Está la mayor parte de la información\n\
         5: Está toda la información\n\n\
         Devuelve SÓLO el número."
    );
    let messages = [
        ChatMessage::system(CONFIDENCE_SYSTEM_PROMPT),
        ChatMessage::user(prompt),
    ];

    match llm.complete(&messages).await {
        Ok(raw) => parse_confidence(&raw),
        Err(err) => {
            warn!("La sub-llamada de confianza falló, se degrada a 0: {err}");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::models::ChunkPoint;

    struct MockEmbedder {
        vector: Vec<f32>,
    }

    #[async_trait]
    impl Embedder for MockEmbedder {
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }
    }

    struct MockStore {
        hits: Vec<SearchHit>,
    }

    #[async_trait]
    impl VectorIndex for MockStore {
        async fn upsert_points(&self, _points: &[ChunkPoint]) -> Result<()> {
            Ok(())
        }

        async fn search(&self, _vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
            Ok(self.hits.iter().take(limit).cloned().collect())
        }
    }

    /// LLM de mentira: devuelve respuestas precargadas en orden y
    /// cuenta las llamadas recibidas.
    struct MockChat {
        replies: Mutex<VecDeque<Result<String>>>,
        calls: AtomicUsize,
    }

    impl MockChat {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatModel for MockChat {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("sin respuestas precargadas")))
        }
    }

    fn params() -> RetrievalParams {
        RetrievalParams { top_k: 5, min_score: 0.6, relevance_threshold: 0.5 }
    }

    fn hit(text: &str, source: &str, score: f32, vector: Vec<f32>) -> SearchHit {
        SearchHit { text: text.to_string(), source: source.to_string(), score, vector }
    }

    #[test]
    fn coseno_de_vectores_identicos_es_uno() {
        let v = vec![0.3, 0.5, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn coseno_de_vectores_ortogonales_es_cero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn sin_candidatos_devuelve_el_centinela() {
        let result = select_relevant(Vec::new(), &[1.0, 0.0], params());
        assert_eq!(result, vec![NO_CONTEXT_MESSAGE.to_string()]);
    }

    #[test]
    fn score_bajo_queda_descartado() {
        let hits = vec![hit("texto", "a.txt", 0.4, vec![1.0, 0.0])];
        let result = select_relevant(hits, &[1.0, 0.0], params());
        assert_eq!(result, vec![NO_CONTEXT_MESSAGE.to_string()]);
    }

    #[test]
    fn relevancia_semantica_descarta_vectores_lejanos() {
        // Score alto pero vector ortogonal a la query: coseno 0 <= 0.5.
        let hits = vec![hit("texto", "a.txt", 0.9, vec![0.0, 1.0])];
        let result = select_relevant(hits, &[1.0, 0.0], params());
        assert_eq!(result, vec![NO_CONTEXT_MESSAGE.to_string()]);
    }

    #[test]
    fn ordena_por_score_trunca_y_cita_fuente() {
        let q = vec![1.0, 0.0];
        let hits = vec![
            hit("peor", "b.txt", 0.7, q.clone()),
            hit("mejor", "a.txt", 0.9, q.clone()),
            hit("medio", "c.txt", 0.8, q.clone()),
        ];
        let mut p = params();
        p.top_k = 2;
        let result = select_relevant(hits, &q, p);
        assert_eq!(
            result,
            vec![
                "[Source: a.txt]\nmejor".to_string(),
                "[Source: c.txt]\nmedio".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn recuperar_contra_indice_vacio_devuelve_centinela() {
        let embedder = MockEmbedder { vector: vec![1.0, 0.0] };
        let store = MockStore { hits: Vec::new() };
        let result = retrieve_similar_docs(&embedder, &store, params(), "cualquier cosa")
            .await
            .unwrap();
        assert_eq!(result, vec![NO_CONTEXT_MESSAGE.to_string()]);
    }

    #[tokio::test]
    async fn centinela_cortocircuita_sin_llamar_al_llm() {
        let llm = MockChat::new(vec![Ok("no debería usarse".to_string())]);
        let context = vec![NO_CONTEXT_MESSAGE.to_string()];
        let result = answer_question(&llm, true, "¿algo?", &context).await.unwrap();

        assert_eq!(result.answer, NO_CONTEXT_MESSAGE);
        assert_eq!(result.confidence, Some(1));
        assert_eq!(result.has_relevant_info, Some(false));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn confianza_cinco_marca_informacion_relevante() {
        let llm = MockChat::new(vec![Ok("respuesta".to_string()), Ok("5".to_string())]);
        let context = vec!["[Source: a.txt]\ndato".to_string()];
        let result = answer_question(&llm, true, "¿pregunta?", &context).await.unwrap();

        assert_eq!(result.confidence, Some(5));
        assert_eq!(result.has_relevant_info, Some(true));
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn confianza_dos_no_marca_informacion_relevante() {
        let llm = MockChat::new(vec![Ok("respuesta".to_string()), Ok("2".to_string())]);
        let context = vec!["[Source: a.txt]\ndato".to_string()];
        let result = answer_question(&llm, true, "¿pregunta?", &context).await.unwrap();

        assert_eq!(result.confidence, Some(2));
        assert_eq!(result.has_relevant_info, Some(false));
    }

    #[tokio::test]
    async fn confianza_no_interpretable_degrada_a_cero() {
        let llm = MockChat::new(vec![Ok("respuesta".to_string()), Ok("high".to_string())]);
        let context = vec!["[Source: a.txt]\ndato".to_string()];
        let result = answer_question(&llm, true, "¿pregunta?", &context).await.unwrap();

        assert_eq!(result.confidence, Some(0));
        assert_eq!(result.has_relevant_info, Some(false));
    }

    #[tokio::test]
    async fn fallo_de_la_subllamada_degrada_a_cero_sin_error() {
        let llm = MockChat::new(vec![
            Ok("respuesta".to_string()),
            Err(anyhow!("503 service unavailable")),
        ]);
        let context = vec!["[Source: a.txt]\ndato".to_string()];
        let result = answer_question(&llm, true, "¿pregunta?", &context).await.unwrap();

        assert_eq!(result.answer, "respuesta");
        assert_eq!(result.confidence, Some(0));
        assert_eq!(result.has_relevant_info, Some(false));
    }

    #[tokio::test]
    async fn fallo_de_la_llamada_principal_es_fatal() {
        let llm = MockChat::new(vec![Err(anyhow!("500 internal server error"))]);
        let context = vec!["[Source: a.txt]\ndato".to_string()];
        assert!(answer_question(&llm, true, "¿pregunta?", &context).await.is_err());
    }

    #[tokio::test]
    async fn modo_simple_omite_los_campos_de_confianza() {
        let llm = MockChat::new(vec![Ok("respuesta".to_string())]);
        let context = vec!["[Source: a.txt]\ndato".to_string()];
        let result = answer_question(&llm, false, "¿pregunta?", &context).await.unwrap();

        assert_eq!(result.confidence, None);
        assert_eq!(result.has_relevant_info, None);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn escenario_completo_de_consulta_sobre_plazos() {
        let q = vec![1.0, 0.2, 0.0];
        let embedder = MockEmbedder { vector: q.clone() };
        let store = MockStore {
            hits: vec![hit(
                "The add/drop deadline is the second Friday of the term.",
                "policy.txt",
                0.82,
                q.clone(),
            )],
        };

        let context =
            retrieve_similar_docs(&embedder, &store, params(), "What is the add/drop deadline?")
                .await
                .unwrap();
        assert_eq!(
            context,
            vec![
                "[Source: policy.txt]\nThe add/drop deadline is the second Friday of the term."
                    .to_string()
            ]
        );

        let llm = MockChat::new(vec![
            Ok("Según la información proporcionada, \"The add/drop deadline is the \
                second Friday of the term.\" [policy.txt]"
                .to_string()),
            Ok("5".to_string()),
        ]);
        let result = answer_question(&llm, true, "What is the add/drop deadline?", &context)
            .await
            .unwrap();

        assert!(result.answer.contains("second Friday of the term"));
        assert!(result.confidence.unwrap() >= 4);
        assert_eq!(result.has_relevant_info, Some(true));
    }
}
