//! Cliente del almacén remoto clave-ruta y tarea de suscripción.
//!
//! Las lecturas reactivas van por un único stream SSE sobre la raíz del
//! árbol: el servidor entrega el valor actual al suscribirse y luego cada
//! cambio. Las escrituras son llamadas REST independientes (PUT por ruta,
//! PATCH multirruta atómico sobre la raíz).
//!
//! # Máquina de estados
//! `Conectar` abre el stream y lo atiende hasta que muere; `Fallo` queda
//! bloqueado esperando una orden explícita de reconexión. La suscripción
//! caída es terminal hasta ese reintento manual.


use std::sync::Arc;
use std::time::Duration;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};
use crate::estado::domain::Actualizacion;
use crate::gateway::domain::{extraer_cambios, Almacen, ControlGateway, EventoSse, ParserSse, Valor};
use crate::system::domain::gateway_const::{KEEP_ALIVE_TIMEOUT_SECS, TIMEOUT_SECS};
use crate::system::domain::{AppError, System};


#[derive(Debug, Clone, Copy, PartialEq)]
enum EstadoCliente {
    Conectar,
    Fallo,
    Fin,
}


/// Cliente REST del almacén remoto. Mantiene un caché del último valor
/// conocido por ruta, alimentado por el stream de suscripción.
#[derive(Clone, Debug)]
pub struct GatewayRtdb {
    cliente: reqwest::Client,
    base_url: String,
    auth: Option<String>,
    cache: Arc<DashMap<String, Valor>>,
}

impl GatewayRtdb {
    pub fn new(system: &System) -> Result<Self, AppError> {
        let cliente = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            cliente,
            base_url: system.rtdb_base_url.clone(),
            auth: system.rtdb_auth.clone(),
            cache: Arc::new(DashMap::new()),
        })
    }

    fn url(&self, ruta: &str) -> String {
        let base = if ruta.is_empty() {
            format!("{}/.json", self.base_url)
        } else {
            format!("{}/{}.json", self.base_url, ruta)
        };
        match &self.auth {
            Some(token) => format!("{base}?auth={token}"),
            None => base,
        }
    }

    fn actualizar_cache(&self, ruta: &str, valor: &Option<Valor>) {
        match valor {
            Some(v) => {
                self.cache.insert(ruta.to_string(), v.clone());
            }
            None => {
                self.cache.remove(ruta);
            }
        }
    }
}

impl Almacen for GatewayRtdb {
    /// Lee un booleano: primero el eco más reciente del stream, si no hay
    /// valor cacheado consulta el almacén. Ausente se interpreta apagado.
    async fn leer_bool(&self, ruta: &str) -> Result<bool, AppError> {
        if let Some(valor) = self.cache.get(ruta) {
            return Ok(valor.como_bool().unwrap_or(false));
        }

        let cuerpo = self.cliente
            .get(self.url(ruta))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let valor: serde_json::Value = serde_json::from_str(&cuerpo)
            .map_err(|e| AppError::Remoto(e.to_string()))?;
        Ok(valor.as_bool().unwrap_or(false))
    }

    async fn escribir(&self, ruta: &str, valor: serde_json::Value) -> Result<(), AppError> {
        self.cliente
            .put(self.url(ruta))
            .json(&valor)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn escribir_multi(&self, pares: Vec<(String, serde_json::Value)>) -> Result<(), AppError> {
        let cuerpo: serde_json::Map<String, serde_json::Value> = pares.into_iter().collect();
        self.cliente
            .patch(self.url(""))
            .json(&cuerpo)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}


async fn conectar(gw: &GatewayRtdb) -> Result<reqwest::Response, AppError> {
    let respuesta = gw.cliente
        .get(gw.url(""))
        .header("Accept", "text/event-stream")
        .send()
        .await?
        .error_for_status()?;
    Ok(respuesta)
}


async fn manejar_evento(ev: &EventoSse,
                        gw: &GatewayRtdb,
                        tx: &mpsc::Sender<Actualizacion>) -> Result<(), AppError> {

    match ev.evento.as_str() {
        "put" | "patch" => {
            let cuerpo: serde_json::Value = serde_json::from_str(&ev.datos)
                .map_err(|e| AppError::Remoto(e.to_string()))?;
            let ruta = cuerpo.get("path").and_then(|p| p.as_str()).unwrap_or("/");
            let datos = cuerpo.get("data").cloned().unwrap_or(serde_json::Value::Null);

            for cambio in extraer_cambios(ruta, &datos, ev.evento == "put") {
                gw.actualizar_cache(&cambio.ruta, &cambio.valor);
                if tx.send(Actualizacion::Cambio(cambio)).await.is_err() {
                    error!("Error: no se pudo entregar el cambio al agregador");
                }
            }
            Ok(())
        }
        "keep-alive" => {
            debug!("Debug: keep-alive del stream");
            Ok(())
        }
        "cancel" | "auth_revoked" => {
            Err(AppError::Remoto(format!("suscripción cancelada por el servidor: {}", ev.evento)))
        }
        otro => {
            warn!("Warning: evento SSE desconocido: {otro}");
            Ok(())
        }
    }
}


async fn procesar(respuesta: reqwest::Response,
                  gw: &GatewayRtdb,
                  tx: &mpsc::Sender<Actualizacion>,
                  rx_ctrl: &mut mpsc::Receiver<ControlGateway>) -> EstadoCliente {

    let flujo = respuesta.bytes_stream();
    tokio::pin!(flujo);
    let mut parser = ParserSse::new();

    loop {
        tokio::select! {
            trozo = flujo.next() => {   // Recibir datos (Downstream)
                match trozo {
                    Some(Ok(bytes)) => {
                        for ev in parser.empujar(&bytes) {
                            if let Err(e) = manejar_evento(&ev, gw, tx).await {
                                error!("Error: stream SSE {e}");
                                let _ = tx.send(Actualizacion::Fallo(e.to_string())).await;
                                return EstadoCliente::Fallo;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("Error: stream SSE {e}");
                        let _ = tx.send(Actualizacion::Fallo(e.to_string())).await;
                        return EstadoCliente::Fallo;
                    }
                    None => {
                        warn!("Warning: stream cerrado por el servidor");
                        return EstadoCliente::Fallo;
                    }
                }
            }

            ctrl = rx_ctrl.recv() => {   // Órdenes de control
                match ctrl {
                    Some(ControlGateway::Reconectar) => {
                        info!("Info: reconexión solicitada, rearmando stream");
                        return EstadoCliente::Conectar;
                    }
                    None => {
                        info!("Info: canal de control cerrado, terminando tarea");
                        return EstadoCliente::Fin;
                    }
                }
            }

            _ = sleep(Duration::from_secs(KEEP_ALIVE_TIMEOUT_SECS)) => {
                warn!("Warning: keep-alive vencido, conexión perdida");
                return EstadoCliente::Fallo;
            }
        }
    }
}


/// Tarea de suscripción contra el almacén remoto.
///
/// Conecta el stream SSE, entrega cada cambio al agregador y marca la
/// conexión de backend al subir y al caer. En `Fallo` no reintenta: espera
/// `ControlGateway::Reconectar`.
pub async fn run_gateway(tx: mpsc::Sender<Actualizacion>,
                         mut rx_ctrl: mpsc::Receiver<ControlGateway>,
                         gw: GatewayRtdb) {

    info!("Info: gateway task creada");
    let mut estado = EstadoCliente::Conectar;

    loop {
        match estado {
            EstadoCliente::Conectar => {
                match conectar(&gw).await {
                    Ok(respuesta) => {
                        info!("Info: stream SSE conectado");
                        if tx.send(Actualizacion::Conexion(true)).await.is_err() {
                            return;
                        }
                        estado = procesar(respuesta, &gw, &tx, &mut rx_ctrl).await;
                        if estado == EstadoCliente::Fallo {
                            let _ = tx.send(Actualizacion::Conexion(false)).await;
                        }
                    }
                    Err(e) => {
                        error!("Error: no se pudo conectar el stream SSE: {e}");
                        let _ = tx.send(Actualizacion::Conexion(false)).await;
                        let _ = tx.send(Actualizacion::Fallo(e.to_string())).await;
                        estado = EstadoCliente::Fallo;
                    }
                }
            }

            EstadoCliente::Fallo => {
                match rx_ctrl.recv().await {
                    Some(ControlGateway::Reconectar) => {
                        info!("Info: reconexión manual solicitada");
                        estado = EstadoCliente::Conectar;
                    }
                    None => return,
                }
            }

            EstadoCliente::Fin => {
                info!("Info: gateway task finalizada");
                return;
            }
        }
    }
}


pub fn start_gateway(tx_to_estado: mpsc::Sender<Actualizacion>,
                     rx_from_estado: mpsc::Receiver<ControlGateway>,
                     gw: GatewayRtdb) {

    info!("Info: iniciando tarea gateway");
    tokio::spawn(async move {
        run_gateway(tx_to_estado,
                    rx_from_estado,
                    gw).await;
    });
}
