//! Troceado de documentos en chunks acotados por tamaño.
//!
//! Dos políticas:
//!   - `FixedWindow`: ventana deslizante de `size` caracteres con solape.
//!   - `ParagraphAware`: empaqueta párrafos completos hasta `size`,
//!     cayendo a la ventana fija si un párrafo suelto la supera.

use crate::config::ChunkStrategy;

/// Trocea `text` según la estrategia configurada.
///
/// Garantías: todo el contenido del texto aparece en algún chunk,
/// ningún chunk es vacío y se conserva el orden original.
pub fn chunk_text(text: &str, strategy: ChunkStrategy, size: usize, overlap: usize) -> Vec<String> {
    match strategy {
        ChunkStrategy::FixedWindow => fixed_window(text, size, overlap),
        ChunkStrategy::ParagraphAware => paragraph_aware(text, size, overlap),
    }
}

/// Ventana deslizante de `size` caracteres que avanza `size - overlap`
/// en cada paso. El último chunk puede ser más corto que `size`.
///
/// Se trabaja sobre caracteres (no bytes) para no partir secuencias UTF-8.
fn fixed_window(text: &str, size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(size > 0 && overlap < size);

    let chars: Vec<char> = text.chars().collect();
    let step = size - overlap;
    let mut chunks = Vec::new();

    let mut start = 0;
    while start < chars.len() {
        let end = usize::min(start + size, chars.len());
        chunks.push(chars[start..end].iter().collect());
        start += step;
    }

    chunks
}

/// Separa por párrafos (líneas en blanco) y los acumula con avaricia
/// hasta agotar `size`; un párrafo que por sí solo excede `size` se
/// trocea con la ventana fija.
fn paragraph_aware(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if paragraph.chars().count() > size {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.extend(fixed_window(paragraph, size, overlap));
            continue;
        }

        if current.chars().count() + paragraph.chars().count() + 2 > size && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ventana_fija_reconstruye_el_texto_completo() {
        let text = "abcdefghijklmnopqrstuvwxyz0123456789";
        let size = 10;
        let overlap = 3;
        let chunks = fixed_window(text, size, overlap);

        assert!(chunks.iter().all(|c| !c.is_empty()));

        // Reconstrucción descontando el solape entre chunks consecutivos.
        let mut rebuilt: String = chunks[0].clone();
        for chunk in &chunks[1..] {
            let tail: String = chunk.chars().skip(overlap).collect();
            rebuilt.push_str(&tail);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn ventana_fija_ultimo_chunk_puede_ser_corto() {
        let chunks = fixed_window("abcdefgh", 5, 1);
        assert_eq!(chunks, vec!["abcde", "efgh"]);
    }

    #[test]
    fn ventana_fija_respeta_limites_utf8() {
        let text = "áéíóúñ".repeat(20);
        let chunks = fixed_window(&text, 7, 2);
        assert!(chunks.iter().all(|c| !c.is_empty()));
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));

        let mut rebuilt: String = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(2));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn ventana_fija_texto_vacio_no_produce_chunks() {
        assert!(fixed_window("", 10, 2).is_empty());
    }

    #[test]
    fn parrafos_pequenos_se_empaquetan_juntos() {
        let text = "Primer párrafo.\n\nSegundo párrafo.";
        let chunks = paragraph_aware(text, 200, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "Primer párrafo.\n\nSegundo párrafo.");
    }

    #[test]
    fn parrafos_que_desbordan_abren_chunk_nuevo() {
        let text = "aaaaaaaaaa\n\nbbbbbbbbbb\n\ncccccccccc";
        let chunks = paragraph_aware(text, 24, 5);
        assert_eq!(chunks, vec!["aaaaaaaaaa\n\nbbbbbbbbbb", "cccccccccc"]);
    }

    #[test]
    fn parrafo_gigante_cae_a_ventana_fija() {
        let big = "x".repeat(120);
        let text = format!("intro corta\n\n{big}\n\ncierre");
        let chunks = paragraph_aware(&text, 50, 10);

        assert!(chunks.iter().all(|c| !c.is_empty()));
        assert_eq!(chunks[0], "intro corta");
        // Todo el contenido del párrafo gigante queda cubierto.
        let joined = chunks.join("");
        assert!(joined.matches('x').count() >= 120);
        assert!(chunks.last().unwrap().contains("cierre"));
    }

    #[test]
    fn todo_parrafo_aparece_en_algun_chunk() {
        let text = "uno\n\ndos\n\n\n\ntres cuatro\n\ncinco";
        let chunks = paragraph_aware(text, 12, 3);
        for paragraph in ["uno", "dos", "tres cuatro", "cinco"] {
            assert!(
                chunks.iter().any(|c| c.contains(paragraph)),
                "falta el párrafo '{paragraph}' en {chunks:?}"
            );
        }
    }
}
