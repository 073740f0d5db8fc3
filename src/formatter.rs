//! 搜尋結果轉成聊天訊息

use crate::search::MAX_MATCHES;
use crate::types::{AnimeMatch, AnimeMetadata, SearchResult};

/// 相似度達到此值視為可靠（固定政策，不開放設定）
pub const RELIABLE_THRESHOLD: f64 = 0.90;

pub const NO_MATCH_MESSAGE: &str = "未找到匹配的动漫场景";

/// 秒數轉成 mm:ss，超過一小時顯示 hh:mm:ss
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let (m, s) = (total / 60, total % 60);
    let (h, m) = (m / 60, m % 60);
    if h > 0 {
        format!("{:02}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

/// 相似度百分比，限制在 0~100
pub fn similarity_percent(similarity: f64) -> f64 {
    if similarity.is_nan() {
        return 0.0;
    }
    (similarity * 100.0).clamp(0.0, 100.0)
}

pub fn is_reliable(similarity: f64) -> bool {
    similarity >= RELIABLE_THRESHOLD
}

/// 產生完整回覆；`metadata` 依索引對應 `result.matches`，可以比較短
pub fn format(result: &SearchResult, metadata: &[Option<AnimeMetadata>]) -> String {
    if result.is_empty() {
        return NO_MATCH_MESSAGE.to_string();
    }

    let mut output_lines = vec!["🔍 动漫场景识别结果：\n".to_string()];

    for (i, anime) in result.matches.iter().take(MAX_MATCHES).enumerate() {
        let extra = metadata.get(i).and_then(|m| m.as_ref());
        output_lines.push(format_match(i + 1, anime, extra));
    }

    let mut footer = format!("\n💡 搜索了 {} 帧画面", group_thousands(result.frame_count));
    if let Some(quota) = result.quota_remaining {
        footer.push_str(&format!("\n📈 剩余配额: {}", quota));
    }
    footer.push_str("\n⚠️ 相似度低于90%的结果可能不准确");
    output_lines.push(footer);

    output_lines.join("\n")
}

fn format_match(rank: usize, anime: &AnimeMatch, metadata: Option<&AnimeMetadata>) -> String {
    let confidence = if is_reliable(anime.similarity) {
        "结果较准确"
    } else {
        "仅供参考"
    };

    let adult = if anime.is_adult { " 🔞" } else { "" };
    let mut text = format!("#{} 【{}】{}\n", rank, anime.title, adult);

    if let Some(english) = metadata.and_then(|m| m.title.english.as_deref()) {
        if english != anime.title {
            text.push_str(&format!("🌐 {}\n", english));
        }
    }

    text.push_str(&format!(
        "📊 相似度: {:.1}% ({})\n",
        similarity_percent(anime.similarity),
        confidence
    ));
    text.push_str(&format!("⏰ 时间: {}", format_time(anime.at)));
    if anime.from != anime.to {
        text.push_str(&format!(
            " ({}-{})",
            format_time(anime.from),
            format_time(anime.to)
        ));
    }

    text.push_str(&format!(
        "\n📁 文件: {}",
        anime.filename.as_deref().unwrap_or("未知")
    ));

    if let Some(episode) = anime.episode {
        text.push_str(&format!("\n📺 集数: 第{}集", episode));
    }

    let mal_id = anime.mal_id.or_else(|| metadata.and_then(|m| m.mal_id));
    if let Some(mal_id) = mal_id {
        text.push_str(&format!(
            "\n📺 MyAnimeList: https://myanimelist.net/anime/{}",
            mal_id
        ));
    }

    if let Some(url) = metadata.and_then(|m| m.site_url.as_deref()) {
        text.push_str(&format!("\n🔗 AniList: {}", url));
    }

    // 有影片就給影片，沒有再給截圖
    if let Some(preview) = anime.video.as_deref().or(anime.image.as_deref()) {
        text.push_str(&format!("\n🎬 预览: {}", preview));
    }

    text.push('\n');
    text
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
