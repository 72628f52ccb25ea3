//! Dominio del Gateway de Datos Remoto.
//!
//! Define el conjunto fijo de rutas del árbol remoto, el tipo de valor que
//! viaja por los feeds, el parser del protocolo SSE y el ruteo puro de un
//! evento del stream hacia las rutas conocidas. El ruteo es nominal por
//! ruta: agregar un feed nuevo es agregar una constante y un brazo.


use std::future::Future;
use serde::{Deserialize, Serialize};
use crate::system::domain::AppError;


/// Rutas del almacén remoto clave-ruta, relativas a la raíz configurada.
pub mod rutas {
    pub const BOMBA: &str = "actuadores/bomba";
    pub const LUZ: &str = "actuadores/luz";
    pub const ULTRASONICO: &str = "sensor/nivel/ultrasonico";
    pub const SET_MIN: &str = "sensor/nivel/setpoint_ultrasonico_min";
    pub const SET_MAX: &str = "sensor/nivel/setpoint_ultrasonico_max";
    pub const FECHA_HORA: &str = "sensor/nivel/fecha_hora";
    pub const MODE_AUTO: &str = "control/mode_auto";
    pub const ALERTA_SOBRENIVEL: &str = "control/alerta_sobrenivel";

    pub const TODAS: [&str; 8] = [
        BOMBA, LUZ, ULTRASONICO, SET_MIN, SET_MAX,
        FECHA_HORA, MODE_AUTO, ALERTA_SOBRENIVEL,
    ];
}


/// Valor escalar de un feed remoto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Valor {
    Bool(bool),
    Numero(f64),
    Texto(String),
}

impl Valor {
    /// Convierte un valor JSON escalar. Objetos, arreglos y `null` no son valores de feed.
    pub fn desde_json(v: &serde_json::Value) -> Option<Valor> {
        match v {
            serde_json::Value::Bool(b) => Some(Valor::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Valor::Numero),
            serde_json::Value::String(s) => Some(Valor::Texto(s.clone())),
            _ => None,
        }
    }

    pub fn como_bool(&self) -> Option<bool> {
        match self {
            Valor::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// El firmware de la planta a veces publica números como texto, por eso
    /// se acepta también `Texto` parseable.
    pub fn como_numero(&self) -> Option<f64> {
        match self {
            Valor::Numero(n) => Some(*n),
            Valor::Texto(s) => s.parse().ok(),
            Valor::Bool(_) => None,
        }
    }

    pub fn como_texto(&self) -> Option<String> {
        match self {
            Valor::Texto(s) => Some(s.clone()),
            _ => None,
        }
    }
}


/// Cambio observado en una ruta conocida. `valor = None` significa que la
/// ruta quedó vacía en el árbol remoto.
#[derive(Debug, Clone, PartialEq)]
pub struct CambioRemoto {
    pub ruta: String,
    pub valor: Option<Valor>,
}


/// Comandos de control hacia la tarea del gateway.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlGateway {
    /// Reintento manual de la suscripción caída. No hay reintento automático.
    Reconectar,
}


/// Evento crudo del protocolo Server-Sent Events.
#[derive(Debug, Clone, PartialEq)]
pub struct EventoSse {
    pub evento: String,
    pub datos: String,
}


/// Acumulador incremental de bloques SSE.
///
/// Los chunks del stream HTTP no respetan límites de evento ni de secuencia
/// UTF-8, así que el parser retiene tanto el bloque parcial como la cola de
/// bytes incompleta entre llamadas, y sólo emite bloques terminados en
/// línea en blanco.
#[derive(Debug, Default)]
pub struct ParserSse {
    crudo: Vec<u8>,
    pendiente: String,
}

impl ParserSse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un chunk crudo y devuelve los eventos completos que cerró.
    pub fn empujar(&mut self, chunk: &[u8]) -> Vec<EventoSse> {
        self.crudo.extend_from_slice(chunk);
        self.decodificar();

        let mut eventos = Vec::new();
        while let Some(corte) = self.pendiente.find("\n\n") {
            let bloque: String = self.pendiente.drain(..corte + 2).collect();
            if let Some(ev) = parsear_bloque(&bloque) {
                eventos.push(ev);
            }
        }
        eventos
    }

    /// Pasa a texto los bytes acumulados. Una secuencia multibyte cortada
    /// al final del buffer queda retenida hasta el próximo chunk; sólo los
    /// bytes genuinamente inválidos se reemplazan.
    fn decodificar(&mut self) {
        loop {
            match std::str::from_utf8(&self.crudo) {
                Ok(texto) => {
                    self.pendiente.push_str(texto);
                    self.crudo.clear();
                    return;
                }
                Err(e) => {
                    let validos = e.valid_up_to();
                    self.pendiente.push_str(&String::from_utf8_lossy(&self.crudo[..validos]));
                    match e.error_len() {
                        Some(malos) => {
                            self.pendiente.push(char::REPLACEMENT_CHARACTER);
                            self.crudo.drain(..validos + malos);
                        }
                        None => {
                            self.crudo.drain(..validos);
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn parsear_bloque(bloque: &str) -> Option<EventoSse> {
    let mut evento = None;
    let mut datos: Vec<&str> = Vec::new();

    for linea in bloque.lines() {
        if let Some(resto) = linea.strip_prefix("event:") {
            evento = Some(resto.trim().to_string());
        } else if let Some(resto) = linea.strip_prefix("data:") {
            datos.push(resto.trim_start());
        }
    }

    evento.map(|evento| EventoSse {
        evento,
        datos: datos.join("\n"),
    })
}


/// Proyecta un evento `put`/`patch` del stream sobre el conjunto fijo de rutas.
///
/// # Semántica
/// * Evento exactamente sobre una ruta conocida: esa ruta cambia.
/// * Evento sobre un prefijo (ej. la raíz `/`): se navega el JSON hacia cada
///   ruta conocida. En un `put` el subárbol se reemplaza completo, por lo que
///   una ruta ausente se emite como vaciada; en un `patch` sólo se tocan las
///   claves presentes.
pub fn extraer_cambios(ruta_evento: &str, datos: &serde_json::Value, es_put: bool) -> Vec<CambioRemoto> {
    let evento = ruta_evento.trim_matches('/');
    let mut cambios = Vec::new();

    for ruta in rutas::TODAS {
        if ruta == evento {
            cambios.push(CambioRemoto {
                ruta: ruta.to_string(),
                valor: Valor::desde_json(datos),
            });
        } else if evento.is_empty() || ruta.starts_with(&format!("{evento}/")) {
            let resto = ruta[evento.len()..].trim_start_matches('/');
            match navegar(datos, resto) {
                Some(v) => cambios.push(CambioRemoto {
                    ruta: ruta.to_string(),
                    valor: Valor::desde_json(v),
                }),
                // En un patch la ausencia significa "sin cambios".
                None if es_put => cambios.push(CambioRemoto {
                    ruta: ruta.to_string(),
                    valor: None,
                }),
                None => {}
            }
        }
    }
    cambios
}

fn navegar<'a>(datos: &'a serde_json::Value, ruta: &str) -> Option<&'a serde_json::Value> {
    let mut actual = datos;
    for segmento in ruta.split('/') {
        actual = actual.get(segmento)?;
    }
    Some(actual)
}


/// Costura de escritura/lectura puntual contra el almacén remoto.
///
/// Cada operación completa o falla atómicamente por llamada; este nivel no
/// implementa reintentos ni backoff y las fallas transitorias se propagan
/// directamente al llamador.
pub trait Almacen: Send + Sync {
    fn leer_bool(&self, ruta: &str) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn escribir(&self, ruta: &str, valor: serde_json::Value) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Escritura atómica multi-ruta (un único PATCH sobre la raíz).
    fn escribir_multi(&self, pares: Vec<(String, serde_json::Value)>) -> impl Future<Output = Result<(), AppError>> + Send;
}
